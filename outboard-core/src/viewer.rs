//! The viewer: single owner of all display state
//!
//! Every stream source, navigation command, zoom and replot completion is
//! funnelled through one `Viewer`, so the display list has exactly one
//! writer. Hosts drive it from a single task and ask it to render when
//! [`Viewer::take_render_request`] reports a change.

use crate::display_list::{DisplayList, NavOutcome};
use crate::error::{ViewerError, ViewerResult};
use crate::frames::{CoordinateFrameTrail, FrameSelection};
use crate::invocation::{InvocationResult, ProducerInvocation};
use crate::playback::{PlaybackController, PlaybackState, PlaybackTick};
use crate::protocol::{commands, Command, FrameDecoder, OpcodeReader, ProtocolResult, ReadOutcome, WireOrder};
use crate::record::{PlotRecord, RecordAssembler, StreamEvent};
use crate::render::{replay, Renderer};
use crate::replot::{ReplotError, ReplotJob, ReplotKind, ReplotResult, ReplotRunner, ReplotSettings};
use crate::types::{DataPoint, FrameOrdinal, Ordinal, PixelRect, SourceId};
use crate::viewport::{DeviceWindow, ViewportState};
use crate::zoom::{ZoomMode, ZoomOrchestrator};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub retention: Option<NonZeroUsize>,
    /// Show each record as soon as it is finalized
    pub movie_ingest: bool,
    pub movie_interval: Duration,
    pub replot_on_zoom: bool,
    pub byte_order: WireOrder,
    pub width: u32,
    pub height: u32,
    pub replot: ReplotSettings,
    /// Command line of the producer, needed for replot
    pub command_line: Option<String>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            retention: None,
            movie_ingest: false,
            movie_interval: Duration::from_millis(100),
            replot_on_zoom: false,
            byte_order: WireOrder::native(),
            width: 800,
            height: 618,
            replot: ReplotSettings::default(),
            command_line: None,
        }
    }
}

/// What one batch of stream input changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub ready: Vec<Ordinal>,
    pub evicted: Vec<Ordinal>,
    pub current_changed: bool,
    pub quit: bool,
    /// The reader would block; this source is still open and takes further
    /// bytes through [`Viewer::ingest`]
    pub unfinished: Option<SourceId>,
}

#[derive(Debug)]
pub enum ZoomOutcome {
    ViewApplied(DeviceWindow),
    ViewReset,
    /// Run the job with [`ReplotRunner::run`] and pass the result to
    /// [`Viewer::finish_replot`]
    ReplotScheduled(ReplotJob),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplotOutcome {
    Applied {
        superseded: Ordinal,
        current: Option<Ordinal>,
    },
    /// A newer action changed `current` while the producer ran
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackReadout {
    pub data: DataPoint,
    /// Offset from the relative anchor, when one is set
    pub delta: Option<DataPoint>,
    pub frame: Option<FrameOrdinal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewerStatus {
    pub label: String,
    pub current: Option<Ordinal>,
    pub position: Option<usize>,
    pub count: usize,
    pub playback: PlaybackState,
    pub replot_on_zoom: bool,
    pub replot_pending: bool,
    pub frames: usize,
    pub active_frame: Option<FrameOrdinal>,
    pub window: DeviceWindow,
    pub tracking: bool,
}

#[derive(Debug)]
struct SourceState {
    decoder: FrameDecoder,
    assembler: RecordAssembler,
    /// Page of this stream whose record becomes current
    focus_page: Option<u32>,
    /// Every record from this stream becomes current
    follow: bool,
}

impl SourceState {
    fn drain(&mut self, list: &mut DisplayList, events: &mut Vec<StreamEvent>) -> ProtocolResult<()> {
        while let Some((command, raw)) = self.decoder.next_opcode()? {
            self.assembler.accept(&command, raw, list, events);
        }
        Ok(())
    }
}

pub struct Viewer {
    list: DisplayList,
    viewport: ViewportState,
    frames: CoordinateFrameTrail,
    playback: PlaybackController,
    zoom: ZoomOrchestrator,
    invocation: Option<ProducerInvocation>,
    runner: ReplotRunner,
    byte_order: WireOrder,
    follow_new: bool,
    sources: HashMap<SourceId, SourceState>,
    next_source: SourceId,
    pending_focus: HashSet<Ordinal>,
    epoch: u64,
    replot_pending: Option<u64>,
    tracking: bool,
    anchor: Option<DataPoint>,
    render_requested: bool,
}

impl Viewer {
    pub fn new(options: ViewerOptions) -> ViewerResult<Self> {
        let invocation = options
            .command_line
            .as_deref()
            .map(ProducerInvocation::parse)
            .transpose()?;
        Ok(Self {
            list: DisplayList::new(options.retention),
            viewport: ViewportState::new(options.width, options.height),
            frames: CoordinateFrameTrail::new(),
            playback: PlaybackController::new(options.movie_interval),
            zoom: ZoomOrchestrator::new(options.replot_on_zoom),
            invocation,
            runner: ReplotRunner::new(options.replot),
            byte_order: options.byte_order,
            follow_new: options.movie_ingest || options.retention.is_some(),
            sources: HashMap::new(),
            next_source: 1,
            pending_focus: HashSet::new(),
            epoch: 0,
            replot_pending: None,
            tracking: false,
            anchor: None,
            render_requested: false,
        })
    }

    pub fn display_list(&self) -> &DisplayList {
        &self.list
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn frames(&self) -> &CoordinateFrameTrail {
        &self.frames
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn invocation(&self) -> Option<&ProducerInvocation> {
        self.invocation.as_ref()
    }

    pub fn replot_runner(&self) -> ReplotRunner {
        self.runner
    }

    pub fn current_ordinal(&self) -> Option<Ordinal> {
        self.list.current_ordinal()
    }

    /// True once after anything visible changed
    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.render_requested)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
        self.render_requested = true;
    }

    // ---- stream sources ----

    /// Attach a new producer stream. Its first record becomes current.
    pub fn open_source(&mut self) -> SourceId {
        self.attach_source(1, self.follow_new)
    }

    fn attach_source(&mut self, focus_page: u32, follow: bool) -> SourceId {
        let id = self.next_source;
        self.next_source += 1;
        self.sources.insert(
            id,
            SourceState {
                decoder: FrameDecoder::new(self.byte_order),
                assembler: RecordAssembler::new(id, self.byte_order),
                focus_page: Some(focus_page),
                follow,
            },
        );
        log::debug!("source {} opened", id);
        id
    }

    /// Feed a chunk of bytes from `source`.
    ///
    /// A protocol error drops the source along with its partial record.
    pub fn ingest(&mut self, source: SourceId, bytes: &[u8]) -> ViewerResult<IngestReport> {
        let before = self.list.current_ordinal();
        let mut events = Vec::new();
        let outcome = {
            let state = self
                .sources
                .get_mut(&source)
                .ok_or(ViewerError::UnknownSource(source))?;
            state.decoder.feed(bytes);
            state.drain(&mut self.list, &mut events)
        };
        let mut report = IngestReport::default();
        self.apply_events(source, events, &mut report);
        self.finish_report(before, &mut report);

        if let Err(e) = outcome {
            self.abort_source(source);
            return Err(e.into());
        }
        Ok(report)
    }

    /// The source reached end of stream.
    pub fn close_source(&mut self, source: SourceId) -> ViewerResult<IngestReport> {
        let mut state = self
            .sources
            .remove(&source)
            .ok_or(ViewerError::UnknownSource(source))?;
        state.decoder.finish()?;

        let before = self.list.current_ordinal();
        let mut events = Vec::new();
        state.assembler.close(&mut self.list, &mut events);
        let mut report = IngestReport::default();
        self.apply_events(source, events, &mut report);
        self.finish_report(before, &mut report);
        log::debug!("source {} closed", source);
        Ok(report)
    }

    /// Drop a source without keeping its partial record.
    pub fn abort_source(&mut self, source: SourceId) {
        if let Some(mut state) = self.sources.remove(&source) {
            if let Some(ordinal) = state.assembler.abandon() {
                self.pending_focus.remove(&ordinal);
                log::warn!("source {}: discarded partial record {}", source, ordinal);
            }
        }
    }

    /// Decode a stream as a new source until it ends.
    ///
    /// A reader that would block ends the load early. The source stays open
    /// with the bytes read so far and is returned in
    /// [`IngestReport::unfinished`].
    pub fn load_stream<R: Read>(&mut self, reader: R) -> ViewerResult<IngestReport> {
        let source = self.open_source();
        self.read_source(source, reader)
    }

    fn read_source<R: Read>(&mut self, source: SourceId, reader: R) -> ViewerResult<IngestReport> {
        let mut reader = OpcodeReader::new(reader, self.byte_order);
        let before = self.list.current_ordinal();
        let mut report = IngestReport::default();

        loop {
            let outcome = reader.read_next();
            match outcome {
                Ok(ReadOutcome::Opcode(command, raw)) => {
                    let mut events = Vec::new();
                    if let Some(state) = self.sources.get_mut(&source) {
                        state.assembler.accept(&command, &raw, &mut self.list, &mut events);
                    }
                    self.apply_events(source, events, &mut report);
                }
                Ok(ReadOutcome::Incomplete) => {
                    if let Some(state) = self.sources.get_mut(&source) {
                        state.decoder = reader.into_decoder();
                    }
                    log::debug!("source {} would block, left open", source);
                    report.unfinished = Some(source);
                    self.finish_report(before, &mut report);
                    return Ok(report);
                }
                Ok(ReadOutcome::EndOfStream) => break,
                Err(e) => {
                    self.abort_source(source);
                    self.finish_report(before, &mut report);
                    return Err(e.into());
                }
            }
        }

        if let Some(mut state) = self.sources.remove(&source) {
            let mut events = Vec::new();
            state.assembler.close(&mut self.list, &mut events);
            self.apply_events(source, events, &mut report);
        }
        self.finish_report(before, &mut report);
        Ok(report)
    }

    fn apply_events(&mut self, source: SourceId, events: Vec<StreamEvent>, report: &mut IngestReport) {
        for event in events {
            match event {
                StreamEvent::RecordStarted { ordinal, page } => {
                    let focus = self.sources.get_mut(&source).map_or(false, |state| {
                        let targeted = state.focus_page == Some(page);
                        if targeted {
                            state.focus_page = None;
                        }
                        targeted || state.follow
                    });
                    if focus {
                        self.pending_focus.insert(ordinal);
                    }
                }
                StreamEvent::RecordReady { ordinal, evicted } => {
                    if let Some(record) = self.list.get(ordinal) {
                        log::debug!("record {} finalized ({} bytes)", ordinal, record.len());
                    }
                    let focus = self.pending_focus.remove(&ordinal);
                    if focus || self.list.current_ordinal().is_none() {
                        self.list.set_current(ordinal);
                    }
                    for gone in &evicted {
                        self.pending_focus.remove(gone);
                    }
                    report.ready.push(ordinal);
                    report.evicted.extend(evicted);
                }
                StreamEvent::Quit => report.quit = true,
            }
        }
    }

    fn finish_report(&mut self, before: Option<Ordinal>, report: &mut IngestReport) {
        if self.list.current_ordinal() != before {
            report.current_changed = true;
            self.current_changed();
        }
    }

    fn current_changed(&mut self) {
        self.frames.clear();
        self.render_requested = true;
    }

    // ---- rendering ----

    /// Replay the current record into `renderer` and rebuild its frames.
    pub fn render_current<R: Renderer>(&mut self, renderer: &mut R) -> ViewerResult<Option<R::Raster>> {
        self.render_requested = false;
        let Some(record) = self.list.current() else {
            return Ok(None);
        };
        let raster = replay(record, &mut self.viewport, &mut self.frames, renderer)?;
        Ok(Some(raster))
    }

    /// Replay the current record at another size without touching the
    /// interactive viewport or frame trail.
    pub fn render_offscreen<R: Renderer>(
        &self,
        width: u32,
        height: u32,
        renderer: &mut R,
    ) -> ViewerResult<Option<R::Raster>> {
        let Some(record) = self.list.current() else {
            return Ok(None);
        };
        let mut viewport = self.viewport.clone();
        viewport.resize(width, height);
        let mut trail = CoordinateFrameTrail::new();
        Ok(Some(replay(record, &mut viewport, &mut trail, renderer)?))
    }

    // ---- navigation ----

    fn navigate<F>(&mut self, navigate: F) -> NavOutcome
    where
        F: FnOnce(&mut DisplayList) -> NavOutcome,
    {
        self.epoch += 1;
        let outcome = self.playback.step(&mut self.list, navigate);
        match outcome {
            NavOutcome::Moved(_) => self.current_changed(),
            NavOutcome::AtBoundary(ordinal) => log::debug!("navigation at boundary (record {})", ordinal),
            NavOutcome::Empty => log::debug!("navigation with no records"),
        }
        outcome
    }

    pub fn next(&mut self) -> NavOutcome {
        self.navigate(DisplayList::next)
    }

    pub fn previous(&mut self) -> NavOutcome {
        self.navigate(DisplayList::previous)
    }

    pub fn first(&mut self) -> NavOutcome {
        self.frames.clear_selection();
        self.navigate(DisplayList::first)
    }

    pub fn last(&mut self) -> NavOutcome {
        self.frames.clear_selection();
        self.navigate(DisplayList::last)
    }

    pub fn goto_ordinal(&mut self, ordinal: Ordinal) -> NavOutcome {
        self.navigate(|list| list.goto_ordinal(ordinal))
    }

    /// Delete the current record; reports the record now current.
    pub fn delete_current(&mut self) -> NavOutcome {
        self.navigate(|list| match list.delete_current() {
            Some(removed) => {
                log::info!("deleted record {}", removed.ordinal());
                list.current_ordinal().map_or(NavOutcome::Empty, NavOutcome::Moved)
            }
            None => NavOutcome::Empty,
        })
    }

    pub fn select_frame(&mut self, ordinal: FrameOrdinal) -> ViewerResult<FrameSelection> {
        let selection = self.frames.select(ordinal)?;
        if let FrameSelection::Deferred(o) = selection {
            log::debug!("frame {} selection deferred until next render", o);
        }
        Ok(selection)
    }

    pub fn position_label(&self) -> String {
        match self.list.current_position() {
            Some(position) => format!("Plot {} of {}", position, self.list.len()),
            None if self.list.is_empty() => "No plots".to_string(),
            None => format!("{} plot(s), none selected", self.list.len()),
        }
    }

    // ---- movie ----

    pub fn start_movie(&mut self, interval: Option<Duration>) -> NavOutcome {
        self.epoch += 1;
        self.frames.clear_selection();
        let before = self.list.current_ordinal();
        let outcome = self.playback.start(&mut self.list, interval);
        if self.list.current_ordinal() != before {
            self.current_changed();
        }
        log::info!(
            "movie {} at {:?}",
            if self.playback.is_playing() { "started" } else { "shown" },
            self.playback.interval()
        );
        outcome
    }

    pub fn stop_movie(&mut self) {
        self.playback.stop();
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn movie_interval(&self) -> Duration {
        self.playback.interval()
    }

    pub fn movie_tick(&mut self) -> PlaybackTick {
        let before = self.list.current_ordinal();
        let tick = self.playback.tick(&mut self.list);
        if self.list.current_ordinal() != before {
            self.epoch += 1;
            self.current_changed();
        }
        tick
    }

    // ---- zoom and replot ----

    pub fn begin_zoom_selection(&mut self) {
        self.zoom.begin_selection();
    }

    pub fn zoom_mode(&self) -> ZoomMode {
        self.zoom.mode()
    }

    pub fn toggle_replot_on_zoom(&mut self) -> bool {
        let on = self.zoom.toggle_replot_on_zoom();
        log::info!("replot on zoom {}", if on { "enabled" } else { "disabled" });
        on
    }

    pub fn commit_zoom_selection(&mut self, rect: PixelRect) -> ViewerResult<ZoomOutcome> {
        let selection = self
            .zoom
            .commit(rect, &self.viewport, &self.frames)
            .ok_or(ViewerError::DegenerateSelection)?;

        match self.zoom.mode() {
            ZoomMode::ViewOnly => {
                self.zoom.apply_view_only(&mut self.viewport, &selection);
                self.render_requested = true;
                Ok(ZoomOutcome::ViewApplied(selection.window))
            }
            ZoomMode::Replot => self.schedule_replot(ReplotKind::Zoom, |invocation, output| {
                invocation.rewrite_for_zoom(selection.bounds, output)
            }),
        }
    }

    /// Restore the full view; in replot mode rerun the original command.
    pub fn reset_zoom(&mut self) -> ViewerResult<ZoomOutcome> {
        self.zoom.clear();
        self.viewport.reset_window();
        self.render_requested = true;
        if self.zoom.mode() == ZoomMode::Replot && self.invocation.is_some() {
            return self.schedule_replot(ReplotKind::Reset, |invocation, output| {
                Ok(invocation.with_output(output))
            });
        }
        Ok(ZoomOutcome::ViewReset)
    }

    fn schedule_replot<F>(&mut self, kind: ReplotKind, build: F) -> ViewerResult<ZoomOutcome>
    where
        F: FnOnce(&ProducerInvocation, &Path) -> InvocationResult<ProducerInvocation>,
    {
        let invocation = self.invocation.as_ref().ok_or(ViewerError::NoProducerCommand)?;
        let superseded = self.list.current_ordinal().ok_or(ViewerError::NoCurrentRecord)?;
        self.playback.stop();
        self.epoch += 1;
        let job = ReplotJob::prepare(kind, superseded, self.epoch, |output| {
            build(invocation, output).map_err(ViewerError::from)
        })?;
        self.replot_pending = Some(job.epoch);
        log::debug!("replot of record {} scheduled: {}", superseded, job.invocation);
        Ok(ZoomOutcome::ReplotScheduled(job))
    }

    /// Run a scheduled job on this thread and apply the result.
    pub fn run_replot(&mut self, job: ReplotJob) -> ViewerResult<ReplotOutcome> {
        let result = self.runner.run(&job);
        self.finish_replot(job, result)
    }

    /// Apply the outcome of a replot job.
    ///
    /// The output is decoded in full before anything is published, so on
    /// any failure the superseded record stays current. The new record at
    /// the superseded record's page becomes current, or the last new record
    /// when the output is shorter. A result that arrives after navigation
    /// moved on is discarded.
    pub fn finish_replot(&mut self, job: ReplotJob, result: ReplotResult<PathBuf>) -> ViewerResult<ReplotOutcome> {
        if self.replot_pending == Some(job.epoch) {
            self.replot_pending = None;
        }
        let stale = job.epoch != self.epoch || self.list.current_ordinal() != Some(job.superseded);
        if stale {
            match &result {
                Ok(_) => log::info!("replot of record {} discarded: view moved on", job.superseded),
                Err(e) => log::info!("stale replot of record {} failed: {}", job.superseded, e),
            }
            return Ok(ReplotOutcome::Discarded);
        }
        let path = result?;

        let bytes = std::fs::read(&path)?;
        let pages = count_records(&bytes, self.byte_order)
            .map_err(|source| ReplotError::CorruptOutput { path: path.clone(), source })?;
        if pages == 0 {
            return Err(ReplotError::EmptyOutput(path).into());
        }

        let page = self.list.get(job.superseded).map_or(1, PlotRecord::page);
        let source = self.attach_source(page, false);
        let report = self.read_source(source, std::io::Cursor::new(bytes))?;
        if report.quit {
            log::warn!("replot output requested quit; ignored");
        }
        if self.list.current().map_or(true, |record| record.source() != source) {
            log::debug!("replot output has {} page(s), wanted page {}", pages, page);
            let last = self.list.iter().rev().find(|r| r.source() == source).map(PlotRecord::ordinal);
            if let Some(ordinal) = last {
                self.list.set_current(ordinal);
            }
        }

        self.list.remove(job.superseded);
        self.frames.clear_selection();
        self.current_changed();
        self.viewport.reset_window();
        let current = self.list.current_ordinal();
        log::info!(
            "replot replaced record {} with {:?} ({} new record(s))",
            job.superseded,
            current,
            report.ready.len()
        );
        Ok(ReplotOutcome::Applied {
            superseded: job.superseded,
            current,
        })
    }

    pub fn replot_pending(&self) -> bool {
        self.replot_pending.is_some()
    }

    // ---- pointer tracking ----

    pub fn toggle_tracking(&mut self) -> bool {
        self.tracking = !self.tracking;
        self.tracking
    }

    pub fn set_anchor(&mut self, px: f64, py: f64) -> DataPoint {
        let point = self.frames.reverse_map(&self.viewport, px, py);
        self.anchor = Some(point);
        point
    }

    pub fn clear_anchor(&mut self) {
        self.anchor = None;
    }

    /// Data coordinates under a pixel position.
    pub fn readout(&self, px: f64, py: f64) -> TrackReadout {
        let data = self.frames.reverse_map(&self.viewport, px, py);
        TrackReadout {
            data,
            delta: self
                .anchor
                .map(|anchor| DataPoint::new(data.x - anchor.x, data.y - anchor.y)),
            frame: self.frames.active().map(|f| f.ordinal),
        }
    }

    /// Readout for pointer motion; `None` while tracking is off.
    pub fn track(&self, px: f64, py: f64) -> Option<TrackReadout> {
        self.tracking.then(|| self.readout(px, py))
    }

    pub fn status(&self) -> ViewerStatus {
        ViewerStatus {
            label: self.position_label(),
            current: self.list.current_ordinal(),
            position: self.list.current_position(),
            count: self.list.len(),
            playback: self.playback.state(),
            replot_on_zoom: self.zoom.replot_on_zoom(),
            replot_pending: self.replot_pending(),
            frames: self.frames.len(),
            active_frame: self.frames.active().map(|f| f.ordinal),
            window: self.viewport.window,
            tracking: self.tracking,
        }
    }
}

/// Number of records in a complete stream, or the first decode error.
fn count_records(bytes: &[u8], order: WireOrder) -> ProtocolResult<usize> {
    let mut records = 0;
    for command in commands(bytes, order) {
        if command? == Command::Begin {
            records += 1;
        }
    }
    Ok(records)
}
