use outboard_core::protocol::encode_stream;
use outboard_core::record::RecordBuffer;
use outboard_core::types::{DevicePoint, PixelRect};
use outboard_core::{
    Command, DisplayList, NavOutcome, PlaybackTick, RecordingRenderer, ReplotOutcome, Viewer, ViewerOptions,
    WireOrder, ZoomOutcome,
};
use std::io::Cursor;
use std::num::NonZeroUsize;

fn framed_plot() -> Vec<Command> {
    vec![
        Command::Begin,
        Command::DefineFrame {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 10.0,
            y_max: 10.0,
        },
        Command::MoveTo(DevicePoint::new(0, 0)),
        Command::LineTo(DevicePoint::new(5, 5)),
        Command::End,
    ]
}

fn stream_of(records: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    for _ in 0..records {
        bytes.extend(encode_stream(&framed_plot(), WireOrder::Little));
    }
    bytes
}

fn options() -> ViewerOptions {
    ViewerOptions {
        byte_order: WireOrder::Little,
        width: 100,
        height: 100,
        ..ViewerOptions::default()
    }
}

#[test]
fn single_framed_record_maps_centre_to_five() {
    let mut viewer = Viewer::new(options()).unwrap();
    let report = viewer.load_stream(Cursor::new(stream_of(1))).unwrap();
    assert_eq!(report.ready, vec![1]);

    let record = viewer.display_list().get(1).unwrap();
    assert_eq!(record.len(), 1 + 33 + 5 + 5 + 1);

    viewer.render_current(&mut RecordingRenderer::new()).unwrap();
    assert_eq!(viewer.frames().len(), 1);

    let readout = viewer.readout(50.0, 50.0);
    assert!((readout.data.x - 5.0).abs() < 1e-9);
    assert!((readout.data.y - 5.0).abs() < 1e-9);
}

fn append_framed(list: &mut DisplayList) -> Vec<u64> {
    let ordinal = list.reserve_ordinal();
    let mut buffer = RecordBuffer::new(ordinal, 0);
    buffer.push(&encode_stream(&framed_plot(), WireOrder::Little));
    list.append(buffer.finalize(WireOrder::Little))
}

#[test]
fn retention_of_two_keeps_newest() {
    let mut list = DisplayList::new(NonZeroUsize::new(2));
    append_framed(&mut list);
    append_framed(&mut list);
    assert!(list.set_current(1));

    assert_eq!(append_framed(&mut list), vec![1]);
    assert_eq!(list.ordinals(), vec![2, 3]);
    assert_eq!(list.current_ordinal(), Some(2));
}

#[test]
fn retention_shows_each_new_record() {
    let mut viewer = Viewer::new(ViewerOptions {
        retention: NonZeroUsize::new(2),
        ..options()
    })
    .unwrap();
    let source = viewer.open_source();

    let one = encode_stream(&framed_plot(), WireOrder::Little);
    viewer.ingest(source, &one).unwrap();
    viewer.ingest(source, &one).unwrap();
    viewer.goto_ordinal(1);
    assert_eq!(viewer.current_ordinal(), Some(1));

    let report = viewer.ingest(source, &one).unwrap();
    assert_eq!(report.evicted, vec![1]);
    assert_eq!(viewer.display_list().ordinals(), vec![2, 3]);
    assert_eq!(viewer.current_ordinal(), Some(3));
}

#[test]
fn interleaved_sources_keep_the_late_record() {
    let mut viewer = Viewer::new(ViewerOptions {
        retention: NonZeroUsize::new(2),
        ..options()
    })
    .unwrap();
    let one = encode_stream(&framed_plot(), WireOrder::Little);
    let (head, tail) = one.split_at(1);

    let slow = viewer.open_source();
    viewer.ingest(slow, head).unwrap();
    let fast = viewer.open_source();
    let mut two = one.clone();
    two.extend_from_slice(&one);
    assert_eq!(viewer.ingest(fast, &two).unwrap().ready, vec![2, 3]);

    let report = viewer.ingest(slow, tail).unwrap();
    assert_eq!(report.ready, vec![1]);
    assert_eq!(report.evicted, vec![2]);
    assert!(viewer.display_list().contains(1));
    assert_eq!(viewer.display_list().ordinals(), vec![3, 1]);
    assert_eq!(viewer.current_ordinal(), Some(1));
}

#[test]
fn movie_visits_records_in_order_and_halts() {
    let mut viewer = Viewer::new(options()).unwrap();
    viewer.load_stream(Cursor::new(stream_of(3))).unwrap();
    viewer.last();

    assert_eq!(
        viewer.start_movie(Some(std::time::Duration::from_millis(100))),
        NavOutcome::Moved(1)
    );
    let mut visited = vec![viewer.current_ordinal().unwrap()];
    while viewer.is_playing() {
        match viewer.movie_tick() {
            PlaybackTick::Advanced(o) | PlaybackTick::Finished(o) => visited.push(o),
            PlaybackTick::Idle => break,
        }
    }
    assert_eq!(visited, vec![1, 2, 3]);
    assert_eq!(viewer.movie_tick(), PlaybackTick::Idle);
    assert_eq!(viewer.current_ordinal(), Some(3));
}

#[test]
fn navigation_past_ends_reports_boundary() {
    let mut viewer = Viewer::new(options()).unwrap();
    assert_eq!(viewer.next(), NavOutcome::Empty);

    viewer.load_stream(Cursor::new(stream_of(2))).unwrap();
    assert_eq!(viewer.previous(), NavOutcome::AtBoundary(1));
    assert_eq!(viewer.next(), NavOutcome::Moved(2));
    assert_eq!(viewer.next(), NavOutcome::AtBoundary(2));
}

#[test]
fn partial_record_at_clean_eof_is_kept() {
    let mut bytes = stream_of(1);
    bytes.extend(encode_stream(
        &[Command::Begin, Command::Point(DevicePoint::new(1, 1))],
        WireOrder::Little,
    ));
    let mut viewer = Viewer::new(options()).unwrap();
    let report = viewer.load_stream(Cursor::new(bytes)).unwrap();
    assert_eq!(report.ready, vec![1, 2]);
    assert_eq!(viewer.display_list().get(2).unwrap().len(), 1 + 5);
}

#[test]
fn view_only_zoom_twice_gives_same_viewport() {
    let mut viewer = Viewer::new(options()).unwrap();
    viewer.load_stream(Cursor::new(stream_of(1))).unwrap();
    viewer.render_current(&mut RecordingRenderer::new()).unwrap();
    let rect = PixelRect::new(10, 10, 40, 40);

    viewer.begin_zoom_selection();
    let first = match viewer.commit_zoom_selection(rect).unwrap() {
        ZoomOutcome::ViewApplied(window) => window,
        other => panic!("unexpected {:?}", other),
    };
    let once = viewer.viewport().clone();
    assert_eq!(once.window, first);
    assert!(!once.window.is_full());
    assert!(viewer.take_render_request());
    viewer.render_current(&mut RecordingRenderer::new()).unwrap();

    viewer.begin_zoom_selection();
    let second = match viewer.commit_zoom_selection(rect).unwrap() {
        ZoomOutcome::ViewApplied(window) => window,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(second, first);
    assert_eq!(viewer.viewport(), &once);
}

#[cfg(unix)]
mod replot {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_producer(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("producer.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Producer that writes `payload` to its `-output=` file
    fn writes_output(dir: &std::path::Path, payload: &str) -> std::path::PathBuf {
        write_producer(
            dir,
            &format!(
                r#"for arg in "$@"; do
  case "$arg" in
    -output=*) printf '{}' > "${{arg#-output=}}" ;;
  esac
done"#,
                payload
            ),
        )
    }

    fn replot_viewer(script: &std::path::Path, records: usize) -> Viewer {
        let mut viewer = Viewer::new(ViewerOptions {
            replot_on_zoom: true,
            command_line: Some(script.display().to_string()),
            ..options()
        })
        .unwrap();
        viewer.load_stream(Cursor::new(stream_of(records))).unwrap();
        viewer
    }

    fn zoom_job(viewer: &mut Viewer) -> outboard_core::ReplotJob {
        match viewer.commit_zoom_selection(PixelRect::new(0, 0, 50, 50)).unwrap() {
            ZoomOutcome::ReplotScheduled(job) => job,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn corrupt_output_leaves_current() {
        let dir = tempfile::tempdir().unwrap();
        let script = writes_output(dir.path(), "GEZ");
        let mut viewer = replot_viewer(&script, 2);
        viewer.next();
        assert_eq!(viewer.current_ordinal(), Some(2));

        let job = zoom_job(&mut viewer);
        assert!(viewer.run_replot(job).is_err());
        assert_eq!(viewer.current_ordinal(), Some(2));
        assert_eq!(viewer.display_list().ordinals(), vec![1, 2]);
    }

    #[test]
    fn multi_page_replot_returns_to_same_page() {
        let dir = tempfile::tempdir().unwrap();
        let script = writes_output(dir.path(), "GEGEGE");
        let mut viewer = replot_viewer(&script, 3);
        viewer.goto_ordinal(2);

        let job = zoom_job(&mut viewer);
        assert_eq!(
            viewer.run_replot(job).unwrap(),
            ReplotOutcome::Applied {
                superseded: 2,
                current: Some(5)
            }
        );
        assert_eq!(viewer.display_list().ordinals(), vec![1, 3, 4, 5, 6]);
        assert_eq!(viewer.display_list().current().unwrap().page(), 2);
    }

    #[test]
    fn replot_swaps_in_fresh_record() {
        let dir = tempfile::tempdir().unwrap();
        let args_log = dir.path().join("args.txt");
        let script = write_producer(
            dir.path(),
            &format!(
                r#"out=""
for arg in "$@"; do
  case "$arg" in
    -output=*) out="${{arg#-output=}}" ;;
  esac
done
echo "$@" > "{}"
printf 'GE' > "$out""#,
                args_log.display()
            ),
        );

        let mut viewer = Viewer::new(ViewerOptions {
            replot_on_zoom: true,
            command_line: Some(format!("{} -col=x,y -limit=xMin=0 data.sdds", script.display())),
            ..options()
        })
        .unwrap();
        viewer.load_stream(Cursor::new(stream_of(2))).unwrap();
        viewer.render_current(&mut RecordingRenderer::new()).unwrap();

        let job = match viewer.commit_zoom_selection(PixelRect::new(0, 0, 50, 50)).unwrap() {
            ZoomOutcome::ReplotScheduled(job) => job,
            other => panic!("unexpected {:?}", other),
        };
        let outcome = viewer.run_replot(job).unwrap();
        assert_eq!(
            outcome,
            ReplotOutcome::Applied {
                superseded: 1,
                current: Some(3)
            }
        );
        assert_eq!(viewer.display_list().ordinals(), vec![2, 3]);
        assert_eq!(viewer.display_list().get(3).unwrap().commands(), b"GE");

        let args = std::fs::read_to_string(&args_log).unwrap();
        assert!(args.contains("-col=x,y"));
        assert!(args.contains("-limit=xMin=0,xMax=5,yMin="));
        assert!(args.contains(",autoscaling -output="));
        assert!(!args.contains("-limit=xMin=0 "));
    }

    #[test]
    fn failing_producer_leaves_current() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_producer(dir.path(), "exit 3");
        let mut viewer = Viewer::new(ViewerOptions {
            replot_on_zoom: true,
            command_line: Some(script.display().to_string()),
            ..options()
        })
        .unwrap();
        viewer.load_stream(Cursor::new(stream_of(2))).unwrap();
        viewer.next();

        let job = match viewer.commit_zoom_selection(PixelRect::new(0, 0, 50, 50)).unwrap() {
            ZoomOutcome::ReplotScheduled(job) => job,
            other => panic!("unexpected {:?}", other),
        };
        assert!(viewer.run_replot(job).is_err());
        assert_eq!(viewer.current_ordinal(), Some(2));
        assert_eq!(viewer.display_list().len(), 2);
    }
}
