//! Plot records and per-stream record assembly
//!
//! A record is the byte-exact span of one plot, `Begin` through `End`
//! inclusive. While a record is being received it lives in a
//! [`RecordBuffer`] owned by the stream that is filling it; once `End`
//! arrives it is frozen into an immutable [`PlotRecord`] and handed to the
//! display list.

use crate::display_list::DisplayList;
use crate::protocol::{Command, WireOrder};
use crate::types::{Ordinal, SourceId};

/// A finalized plot record
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRecord {
    ordinal: Ordinal,
    source: SourceId,
    page: u32,
    commands: Box<[u8]>,
    byte_order: WireOrder,
}

impl PlotRecord {
    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// One-based position of this record within its source's stream
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Raw wire bytes, `Begin` through `End`
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub fn byte_order(&self) -> WireOrder {
        self.byte_order
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A record still receiving opcodes
#[derive(Debug)]
pub struct RecordBuffer {
    ordinal: Ordinal,
    source: SourceId,
    page: u32,
    bytes: Vec<u8>,
}

impl RecordBuffer {
    pub fn new(ordinal: Ordinal, source: SourceId) -> Self {
        Self {
            ordinal,
            source,
            page: 1,
            bytes: Vec::new(),
        }
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn push(&mut self, raw: &[u8]) {
        self.bytes.extend_from_slice(raw);
    }

    pub fn finalize(self, byte_order: WireOrder) -> PlotRecord {
        PlotRecord {
            ordinal: self.ordinal,
            source: self.source,
            page: self.page,
            commands: self.bytes.into_boxed_slice(),
            byte_order,
        }
    }
}

/// Stream-level events produced while assembling records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A `Begin` reserved this ordinal for the source's `page`th record
    RecordStarted { ordinal: Ordinal, page: u32 },
    /// A record was appended to the display list
    RecordReady {
        ordinal: Ordinal,
        evicted: Vec<Ordinal>,
    },
    /// The producer asked the viewer to exit
    Quit,
}

/// Splits one stream's opcodes into records.
#[derive(Debug)]
pub struct RecordAssembler {
    source: SourceId,
    order: WireOrder,
    in_progress: Option<RecordBuffer>,
    pages: u32,
    skipped: u64,
}

impl RecordAssembler {
    pub fn new(source: SourceId, order: WireOrder) -> Self {
        Self {
            source,
            order,
            in_progress: None,
            pages: 0,
            skipped: 0,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    pub fn in_progress(&self) -> Option<&RecordBuffer> {
        self.in_progress.as_ref()
    }

    /// Records started on this stream so far
    pub fn pages(&self) -> u32 {
        self.pages
    }

    /// Opcodes seen outside of any record
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Route one decoded opcode.
    ///
    /// `Begin` while a record is open finalizes the open record first, so
    /// the producer never loses a plot by omitting `End`.
    pub fn accept(
        &mut self,
        command: &Command,
        raw: &[u8],
        list: &mut DisplayList,
        events: &mut Vec<StreamEvent>,
    ) {
        match command {
            Command::Begin => {
                if self.in_progress.is_some() {
                    log::debug!(
                        "source {}: Begin inside open record, handing it off",
                        self.source
                    );
                    self.hand_off(list, events);
                }
                let ordinal = list.reserve_ordinal();
                self.pages += 1;
                let page = self.pages;
                let mut buffer = RecordBuffer::new(ordinal, self.source).on_page(page);
                buffer.push(raw);
                self.in_progress = Some(buffer);
                events.push(StreamEvent::RecordStarted { ordinal, page });
            }
            Command::End => match self.in_progress.as_mut() {
                Some(buffer) => {
                    buffer.push(raw);
                    self.hand_off(list, events);
                }
                None => self.skip(command),
            },
            Command::Quit => {
                events.push(StreamEvent::Quit);
            }
            _ => match self.in_progress.as_mut() {
                Some(buffer) => buffer.push(raw),
                None => self.skip(command),
            },
        }
    }

    /// The stream closed on an opcode boundary.
    ///
    /// A partial record is kept as if it had been terminated.
    pub fn close(&mut self, list: &mut DisplayList, events: &mut Vec<StreamEvent>) {
        if self.in_progress.is_some() {
            log::debug!("source {}: stream closed mid-record, keeping partial plot", self.source);
            self.hand_off(list, events);
        }
    }

    /// Drop the open record without publishing it.
    pub fn abandon(&mut self) -> Option<Ordinal> {
        self.in_progress.take().map(|buffer| buffer.ordinal())
    }

    fn hand_off(&mut self, list: &mut DisplayList, events: &mut Vec<StreamEvent>) {
        if let Some(buffer) = self.in_progress.take() {
            let record = buffer.finalize(self.order);
            let ordinal = record.ordinal();
            let evicted = list.append(record);
            events.push(StreamEvent::RecordReady { ordinal, evicted });
        }
    }

    fn skip(&mut self, command: &Command) {
        self.skipped += 1;
        log::trace!("source {}: {:?} outside a record, skipped", self.source, command.opcode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DevicePoint;

    fn feed(assembler: &mut RecordAssembler, list: &mut DisplayList, commands: &[Command]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for command in commands {
            let raw = command.to_bytes(WireOrder::Little);
            assembler.accept(command, &raw, list, &mut events);
        }
        events
    }

    #[test]
    fn test_record_spans_begin_to_end() {
        let mut list = DisplayList::new(None);
        let mut assembler = RecordAssembler::new(1, WireOrder::Little);
        let commands = [
            Command::LineTo(DevicePoint::new(9, 9)),
            Command::Begin,
            Command::MoveTo(DevicePoint::new(1, 2)),
            Command::End,
        ];
        let events = feed(&mut assembler, &mut list, &commands);

        assert_eq!(assembler.skipped(), 1);
        assert_eq!(
            events,
            vec![
                StreamEvent::RecordStarted { ordinal: 1, page: 1 },
                StreamEvent::RecordReady {
                    ordinal: 1,
                    evicted: vec![]
                }
            ]
        );
        let record = list.get(1).unwrap();
        assert_eq!(record.len(), 1 + 5 + 1);
        assert_eq!(record.commands()[0], b'G');
        assert_eq!(record.source(), 1);
    }

    #[test]
    fn test_begin_hands_off_open_record() {
        let mut list = DisplayList::new(None);
        let mut assembler = RecordAssembler::new(1, WireOrder::Little);
        let events = feed(
            &mut assembler,
            &mut list,
            &[
                Command::Begin,
                Command::Point(DevicePoint::new(1, 1)),
                Command::Begin,
                Command::End,
            ],
        );

        let ready: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::RecordReady { .. }))
            .collect();
        assert_eq!(ready.len(), 2);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(1).unwrap().len(), 1 + 5);
        assert_eq!(list.get(1).unwrap().page(), 1);
        assert_eq!(list.get(2).unwrap().page(), 2);
        assert_eq!(assembler.pages(), 2);
    }

    #[test]
    fn test_close_keeps_partial_record() {
        let mut list = DisplayList::new(None);
        let mut assembler = RecordAssembler::new(1, WireOrder::Little);
        feed(
            &mut assembler,
            &mut list,
            &[Command::Begin, Command::LineWidth(2)],
        );
        assert!(list.is_empty());

        let mut events = Vec::new();
        assembler.close(&mut list, &mut events);
        assert_eq!(list.len(), 1);
        assert!(assembler.in_progress().is_none());
    }

    #[test]
    fn test_quit_is_reported() {
        let mut list = DisplayList::new(None);
        let mut assembler = RecordAssembler::new(1, WireOrder::Little);
        let events = feed(&mut assembler, &mut list, &[Command::Quit]);
        assert_eq!(events, vec![StreamEvent::Quit]);
    }
}
