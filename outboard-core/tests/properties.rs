use outboard_core::frames::CoordinateFrameTrail;
use outboard_core::protocol::{encode_stream, Command};
use outboard_core::record::RecordBuffer;
use outboard_core::types::{DataBounds, DataPoint, DevicePoint, PaletteDefinition, Rgb16};
use outboard_core::{DisplayList, Viewer, ViewerOptions, ViewportState, WireOrder};
use proptest::prelude::*;
use std::num::NonZeroUsize;

fn point() -> impl Strategy<Value = DevicePoint> {
    (0i16..=4096, 0i16..=3165).prop_map(|(x, y)| DevicePoint::new(x, y))
}

fn rgb() -> impl Strategy<Value = Rgb16> {
    (any::<u16>(), any::<u16>(), any::<u16>()).prop_map(|(r, g, b)| Rgb16::new(r, g, b))
}

/// Any opcode that may appear inside a record
fn body_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        point().prop_map(Command::MoveTo),
        point().prop_map(Command::LineTo),
        point().prop_map(Command::Point),
        any::<i16>().prop_map(Command::LineType),
        any::<i16>().prop_map(Command::LineWidth),
        rgb().prop_map(Command::SetColor),
        (any::<i16>(), point(), point()).prop_map(|(shade, a, b)| Command::FilledBox {
            shade,
            x_low: a.x,
            x_high: b.x,
            y_high: b.y,
            y_low: a.y,
        }),
        (-1e6f64..1e6, -1e6f64..1e6, 1.0f64..1e3, 1.0f64..1e3).prop_map(|(x, y, w, h)| {
            Command::DefineFrame {
                x_min: x,
                y_min: y,
                x_max: x + w,
                y_max: y + h,
            }
        }),
        (1i16..256, 0i16..4, rgb(), rgb()).prop_map(|(entries, kind, start, end)| {
            Command::DefinePalette(PaletteDefinition {
                entries,
                kind,
                start,
                end,
            })
        }),
    ]
}

fn order() -> impl Strategy<Value = WireOrder> {
    prop_oneof![Just(WireOrder::Little), Just(WireOrder::Big)]
}

proptest! {
    #[test]
    fn record_length_is_sum_of_opcodes(
        body in prop::collection::vec(body_command(), 0..40),
        order in order(),
        split in 1usize..64,
    ) {
        let mut commands = vec![Command::Begin];
        commands.extend(body.iter().copied());
        commands.push(Command::End);
        let expected: usize = commands.iter().map(|c| c.opcode().frame_len()).sum();
        let bytes = encode_stream(&commands, order);

        let mut viewer = Viewer::new(ViewerOptions { byte_order: order, ..ViewerOptions::default() }).unwrap();
        let source = viewer.open_source();
        let mut ready = Vec::new();
        for chunk in bytes.chunks(split) {
            ready.extend(viewer.ingest(source, chunk).unwrap().ready);
        }
        viewer.close_source(source).unwrap();

        prop_assert_eq!(ready.len(), 1);
        let record = viewer.display_list().get(ready[0]).unwrap();
        prop_assert_eq!(record.len(), expected);
        prop_assert_eq!(record.commands(), &bytes[..]);
    }

    #[test]
    fn retention_keeps_most_recent(keep in 1usize..8, appended in 0usize..30, focus in 0usize..30) {
        let mut list = DisplayList::new(NonZeroUsize::new(keep));
        for i in 0..appended {
            let ordinal = list.reserve_ordinal();
            let mut buffer = RecordBuffer::new(ordinal, 0);
            buffer.push(b"GE");
            list.append(buffer.finalize(WireOrder::Little));
            if i == focus {
                list.set_current(ordinal);
            }
            prop_assert!(list.len() <= keep);
            if let Some(current) = list.current_ordinal() {
                prop_assert!(list.contains(current));
            }
        }

        prop_assert_eq!(list.len(), keep.min(appended));
        let first_kept = appended.saturating_sub(keep) as u64 + 1;
        let expected: Vec<u64> = (first_kept..=appended as u64).collect();
        prop_assert_eq!(list.ordinals(), expected);
    }

    #[test]
    fn reverse_map_inverts_forward_map(
        x_min in -1e4f64..1e4,
        y_min in -1e4f64..1e4,
        w in 1e-3f64..1e4,
        h in 1e-3f64..1e4,
        fx in 0.0f64..=1.0,
        fy in 0.0f64..=1.0,
        width in 1u32..2000,
        height in 1u32..2000,
    ) {
        let mut trail = CoordinateFrameTrail::new();
        trail.begin_build();
        trail.push(DataBounds::new(x_min, x_min + w, y_min, y_min + h));
        trail.finish_build();
        let viewport = ViewportState::new(width, height);

        let point = DataPoint::new(x_min + fx * w, y_min + fy * h);
        let (px, py) = trail.forward_map(&viewport, point);
        let back = trail.reverse_map(&viewport, px, py);
        prop_assert!((back.x - point.x).abs() <= 1e-9 * (1.0 + point.x.abs() + w));
        prop_assert!((back.y - point.y).abs() <= 1e-9 * (1.0 + point.y.abs() + h));
    }
}
