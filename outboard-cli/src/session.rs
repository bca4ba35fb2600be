//! Event loop that owns the viewer
//!
//! Stream readers, the control socket and replot workers talk to the
//! session over one channel. The viewer is only touched from here.

use crate::control::ControlCommand;
use crate::renderer::SummaryRenderer;
use anyhow::{anyhow, Result};
use outboard_core::replot::ReplotResult;
use outboard_core::types::SourceId;
use outboard_core::{
    FrameSelection, IngestReport, NavOutcome, PlaybackTick, ReplotJob, ReplotOutcome, Viewer, ViewerError,
    ViewerResult, ZoomOutcome,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum SessionEvent {
    /// A stream asks for a source id
    Opened {
        label: String,
        /// Protocol errors on a primary stream end the session
        primary: bool,
        reply: oneshot::Sender<SourceId>,
    },
    Data {
        source: SourceId,
        bytes: Vec<u8>,
    },
    Closed {
        source: SourceId,
    },
    Failed {
        source: SourceId,
        message: String,
    },
    Control {
        command: ControlCommand,
        reply: oneshot::Sender<String>,
    },
    ReplotFinished(Box<(ReplotJob, ReplotResult<PathBuf>)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[derive(Debug)]
struct StreamInfo {
    label: String,
    primary: bool,
}

pub struct Session {
    viewer: Viewer,
    renderer: SummaryRenderer,
    streams: HashMap<SourceId, StreamInfo>,
    primaries_seen: bool,
    events: mpsc::Receiver<SessionEvent>,
    sender: mpsc::Sender<SessionEvent>,
    timeout: Option<Duration>,
    /// Stay up after the primary stream ends
    linger: bool,
}

impl Session {
    pub fn new(viewer: Viewer, timeout: Option<Duration>, linger: bool) -> Self {
        let (sender, events) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            viewer,
            renderer: SummaryRenderer::new(),
            streams: HashMap::new(),
            primaries_seen: false,
            events,
            sender,
            timeout,
            linger,
        }
    }

    pub fn sender(&self) -> mpsc::Sender<SessionEvent> {
        self.sender.clone()
    }

    /// Run until quit, timeout, interrupt or, without `linger`, until the
    /// primary streams are done.
    pub async fn run(mut self) -> Result<Viewer> {
        let deadline = tokio::time::sleep(self.timeout.unwrap_or(Duration::MAX));
        tokio::pin!(deadline);
        let mut movie: Option<Interval> = None;

        loop {
            sync_movie_timer(&mut movie, &self.viewer);
            let flow = tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event)?,
                    None => Flow::Quit,
                },
                _ = next_tick(&mut movie) => {
                    self.on_movie_tick();
                    Flow::Continue
                }
                _ = &mut deadline, if self.timeout.is_some() => {
                    log::info!("session timeout reached");
                    Flow::Quit
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("interrupted");
                    Flow::Quit
                }
            };
            self.render_if_requested();
            if flow == Flow::Quit || self.finished() {
                break;
            }
        }

        log::info!("{}", self.viewer.position_label());
        Ok(self.viewer)
    }

    fn finished(&self) -> bool {
        !self.linger
            && self.primaries_seen
            && !self.streams.values().any(|s| s.primary)
            && !self.viewer.replot_pending()
            && !self.viewer.is_playing()
    }

    fn handle(&mut self, event: SessionEvent) -> Result<Flow> {
        match event {
            SessionEvent::Opened { label, primary, reply } => {
                let source = self.viewer.open_source();
                log::info!("{} attached as source {}", label, source);
                self.primaries_seen |= primary;
                self.streams.insert(source, StreamInfo { label, primary });
                if reply.send(source).is_err() {
                    self.streams.remove(&source);
                    self.viewer.abort_source(source);
                }
                Ok(Flow::Continue)
            }
            SessionEvent::Data { source, bytes } => {
                if !self.streams.contains_key(&source) {
                    return Ok(Flow::Continue);
                }
                let result = self.viewer.ingest(source, &bytes);
                self.stream_result(source, result)
            }
            SessionEvent::Closed { source } => {
                if !self.streams.contains_key(&source) {
                    return Ok(Flow::Continue);
                }
                let result = self.viewer.close_source(source);
                let flow = self.stream_result(source, result)?;
                if let Some(info) = self.streams.remove(&source) {
                    log::info!("{} closed", info.label);
                }
                Ok(flow)
            }
            SessionEvent::Failed { source, message } => {
                self.viewer.abort_source(source);
                match self.streams.remove(&source) {
                    Some(info) if info.primary => Err(anyhow!("reading {} failed: {}", info.label, message)),
                    Some(info) => {
                        log::warn!("{} dropped: {}", info.label, message);
                        Ok(Flow::Continue)
                    }
                    None => Ok(Flow::Continue),
                }
            }
            SessionEvent::Control { command, reply } => {
                let (text, flow) = self.execute(command);
                let _ = reply.send(text);
                Ok(flow)
            }
            SessionEvent::ReplotFinished(finished) => {
                let (job, result) = *finished;
                let superseded = job.superseded;
                match self.viewer.finish_replot(job, result) {
                    Ok(ReplotOutcome::Applied { current, .. }) => {
                        log::info!("replot of record {} now showing {:?}", superseded, current);
                    }
                    Ok(ReplotOutcome::Discarded) => {}
                    Err(e) => log::warn!("replot of record {} failed: {}", superseded, e),
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn stream_result(&mut self, source: SourceId, result: ViewerResult<IngestReport>) -> Result<Flow> {
        match result {
            Ok(report) => {
                for ordinal in &report.ready {
                    if let Some(record) = self.viewer.display_list().get(*ordinal) {
                        log::debug!("record {} ready ({} bytes)", ordinal, record.len());
                    }
                }
                if report.quit {
                    log::info!("producer requested quit");
                    return Ok(Flow::Quit);
                }
                Ok(Flow::Continue)
            }
            Err(e) => {
                let info = self.streams.remove(&source);
                match info {
                    Some(info) if info.primary && e.is_fatal() => {
                        Err(anyhow!("{}: {}", info.label, e))
                    }
                    Some(info) => {
                        log::warn!("{} dropped: {}", info.label, e);
                        Ok(Flow::Continue)
                    }
                    None => Ok(Flow::Continue),
                }
            }
        }
    }

    fn on_movie_tick(&mut self) {
        match self.viewer.movie_tick() {
            PlaybackTick::Advanced(ordinal) => log::debug!("movie frame {}", ordinal),
            PlaybackTick::Finished(ordinal) => log::info!("movie finished at record {}", ordinal),
            PlaybackTick::Idle => {}
        }
    }

    fn render_if_requested(&mut self) {
        if !self.viewer.take_render_request() {
            return;
        }
        match self.viewer.render_current(&mut self.renderer) {
            Ok(Some(summary)) => log::info!(
                "{}: {} segment(s), {} point(s), {} box(es), {} frame(s)",
                self.viewer.position_label(),
                summary.segments,
                summary.points,
                summary.boxes,
                self.viewer.frames().len()
            ),
            Ok(None) => log::info!("{}", self.viewer.position_label()),
            Err(e) => log::warn!("could not replay current record: {}", e),
        }
    }

    fn execute(&mut self, command: ControlCommand) -> (String, Flow) {
        let text = match command {
            ControlCommand::Next => self.nav(Viewer::next),
            ControlCommand::Previous => self.nav(Viewer::previous),
            ControlCommand::First => self.nav(Viewer::first),
            ControlCommand::Last => self.nav(Viewer::last),
            ControlCommand::Goto(ordinal) => self.nav(|v| v.goto_ordinal(ordinal)),
            ControlCommand::Delete => self.nav(Viewer::delete_current),
            ControlCommand::Movie(interval) => {
                let outcome = self.viewer.start_movie(interval);
                if self.viewer.is_playing() {
                    format!("playing every {:?}", self.viewer.movie_interval())
                } else {
                    describe(outcome, &self.viewer)
                }
            }
            ControlCommand::Stop => {
                self.viewer.stop_movie();
                "stopped".to_string()
            }
            ControlCommand::Zoom(rect) => {
                self.viewer.begin_zoom_selection();
                let outcome = self.viewer.commit_zoom_selection(rect);
                self.zoom_reply(outcome)
            }
            ControlCommand::Reset => {
                let outcome = self.viewer.reset_zoom();
                self.zoom_reply(outcome)
            }
            ControlCommand::ToggleReplot => {
                let on = self.viewer.toggle_replot_on_zoom();
                format!("replot on zoom {}", on_off(on))
            }
            ControlCommand::Frame(ordinal) => match self.viewer.select_frame(ordinal) {
                Ok(FrameSelection::Applied(o)) => format!("frame {} active", o),
                Ok(FrameSelection::Deferred(o)) => format!("frame {} selected for next render", o),
                Err(e) => error_reply(e),
            },
            ControlCommand::ToggleTracking => {
                let on = self.viewer.toggle_tracking();
                format!("tracking {}", on_off(on))
            }
            ControlCommand::Anchor(Some((px, py))) => {
                let point = self.viewer.set_anchor(px, py);
                json(&point)
            }
            ControlCommand::Anchor(None) => {
                self.viewer.clear_anchor();
                "anchor cleared".to_string()
            }
            ControlCommand::Where(px, py) => json(&self.viewer.readout(px, py)),
            ControlCommand::Status => json(&self.viewer.status()),
            ControlCommand::Quit => return ("bye".to_string(), Flow::Quit),
        };
        (text, Flow::Continue)
    }

    fn nav<F>(&mut self, navigate: F) -> String
    where
        F: FnOnce(&mut Viewer) -> NavOutcome,
    {
        let outcome = navigate(&mut self.viewer);
        describe(outcome, &self.viewer)
    }

    fn zoom_reply(&mut self, outcome: ViewerResult<ZoomOutcome>) -> String {
        match outcome {
            Ok(ZoomOutcome::ViewApplied(w)) => {
                format!("view x {}..{} y {}..{}", w.x_min, w.x_max, w.y_min, w.y_max)
            }
            Ok(ZoomOutcome::ViewReset) => "view reset".to_string(),
            Ok(ZoomOutcome::ReplotScheduled(job)) => {
                let text = format!("replot scheduled: {}", job.invocation);
                self.spawn_replot(job);
                text
            }
            Err(e) => error_reply(e),
        }
    }

    fn spawn_replot(&self, job: ReplotJob) {
        let runner = self.viewer.replot_runner();
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || {
            let result = runner.run(&job);
            let _ = sender.blocking_send(SessionEvent::ReplotFinished(Box::new((job, result))));
        });
    }
}

fn describe(outcome: NavOutcome, viewer: &Viewer) -> String {
    match outcome {
        NavOutcome::Moved(_) => viewer.position_label(),
        NavOutcome::AtBoundary(ordinal) => format!("at boundary ({}, record {})", viewer.position_label(), ordinal),
        NavOutcome::Empty => "no plots".to_string(),
    }
}

fn error_reply(error: ViewerError) -> String {
    format!("error: {}", error)
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("error: {}", e))
}

/// Keep the movie timer in step with the viewer's playback state.
fn sync_movie_timer(timer: &mut Option<Interval>, viewer: &Viewer) {
    if !viewer.is_playing() {
        *timer = None;
        return;
    }
    let period = viewer.movie_interval().max(Duration::from_millis(1));
    if timer.as_ref().map(Interval::period) != Some(period) {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        *timer = Some(interval);
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outboard_core::protocol::encode_stream;
    use outboard_core::types::DevicePoint;
    use outboard_core::{Command, ViewerOptions, WireOrder};

    fn record() -> Vec<u8> {
        encode_stream(
            &[
                Command::Begin,
                Command::MoveTo(DevicePoint::new(0, 0)),
                Command::LineTo(DevicePoint::new(10, 10)),
                Command::End,
            ],
            WireOrder::Little,
        )
    }

    fn session(linger: bool) -> Session {
        let viewer = Viewer::new(ViewerOptions {
            byte_order: WireOrder::Little,
            ..ViewerOptions::default()
        })
        .unwrap();
        Session::new(viewer, None, linger)
    }

    fn open(session: &mut Session, primary: bool) -> SourceId {
        let (reply, mut id) = oneshot::channel();
        session
            .handle(SessionEvent::Opened {
                label: "test".to_string(),
                primary,
                reply,
            })
            .unwrap();
        id.try_recv().unwrap()
    }

    #[test]
    fn test_control_navigation() {
        let mut session = session(true);
        let source = open(&mut session, true);
        let mut bytes = record();
        bytes.extend(record());
        session.handle(SessionEvent::Data { source, bytes }).unwrap();
        session.handle(SessionEvent::Closed { source }).unwrap();

        assert_eq!(session.execute(ControlCommand::Last).0, "Plot 2 of 2");
        assert!(session.execute(ControlCommand::Next).0.starts_with("at boundary"));
        assert_eq!(session.execute(ControlCommand::Delete).0, "Plot 1 of 1");
        assert!(session.execute(ControlCommand::Status).0.contains("\"count\":1"));
        assert_eq!(session.execute(ControlCommand::Quit).1, Flow::Quit);
    }

    #[test]
    fn test_corrupt_primary_stream_is_fatal() {
        let mut session = session(false);
        let source = open(&mut session, true);
        let result = session.handle(SessionEvent::Data {
            source,
            bytes: vec![b'G', 0xFF],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_corrupt_share_connection_is_dropped() {
        let mut session = session(true);
        let good = open(&mut session, false);
        session.handle(SessionEvent::Data { source: good, bytes: record() }).unwrap();

        let bad = open(&mut session, false);
        let flow = session
            .handle(SessionEvent::Data {
                source: bad,
                bytes: vec![0xFF],
            })
            .unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.viewer.display_list().len(), 1);

        // later bytes from the dropped connection are ignored
        session.handle(SessionEvent::Data { source: bad, bytes: record() }).unwrap();
        assert_eq!(session.viewer.display_list().len(), 1);
    }

    #[test]
    fn test_quit_opcode_ends_session() {
        let mut session = session(true);
        let source = open(&mut session, true);
        let bytes = encode_stream(&[Command::Quit], WireOrder::Little);
        assert_eq!(session.handle(SessionEvent::Data { source, bytes }).unwrap(), Flow::Quit);
    }

    #[test]
    fn test_finished_after_primary_closes() {
        let mut session = session(false);
        let source = open(&mut session, true);
        assert!(!session.finished());
        session.handle(SessionEvent::Closed { source }).unwrap();
        assert!(session.finished());
    }
}
