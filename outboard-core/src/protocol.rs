//! MPL wire protocol
//!
//! A plot stream is a sequence of opcodes. Each opcode is one ASCII byte
//! followed by a fixed-size operand payload:
//!
//! | byte | meaning         | operands                                  |
//! |------|-----------------|-------------------------------------------|
//! | `G`  | begin record    | none                                      |
//! | `E`  | end record      | none                                      |
//! | `R`  | quit viewer     | none                                      |
//! | `M`  | move to         | 2 cells: x, y                             |
//! | `V`  | line to         | 2 cells: x, y                             |
//! | `P`  | point           | 2 cells: x, y                             |
//! | `L`  | line type       | 1 cell                                    |
//! | `W`  | line width      | 1 cell                                    |
//! | `B`  | filled box      | 5 cells: shade, x_low, x_high, y_high, y_low |
//! | `U`  | coordinate frame| 4 f64: x_min, y_min, x_max, y_max         |
//! | `C`  | line colour     | 3 cells: r, g, b                          |
//! | `S`  | palette         | 8 cells: entries, kind, r0, g0, b0, r1, g1, b1 |
//!
//! A cell is a 16-bit integer in the byte order of the producing host.
//! Device coordinates span `0..=DEVICE_WIDTH` by `0..=DEVICE_HEIGHT` with
//! the origin at the bottom-left.

use crate::types::{DevicePoint, PaletteDefinition, Rgb16};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Read};
use std::str::FromStr;
use thiserror::Error;

/// Width of one operand cell in bytes
pub const CELL_SIZE: usize = 2;

/// Width of one coordinate-frame operand in bytes
pub const FRAME_VALUE_SIZE: usize = 8;

/// Device extent along x
pub const DEVICE_WIDTH: f64 = 4096.0;

/// Device extent along y
pub const DEVICE_HEIGHT: f64 = 3165.0;

/// Read size used by [`OpcodeReader`]
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown opcode 0x{byte:02x} at stream offset {offset}")]
    UnknownOpcode { byte: u8, offset: u64 },

    #[error("Stream ended inside {opcode} operands ({missing} bytes missing)")]
    Truncated { opcode: Opcode, missing: usize },

    #[error("Invalid byte order '{0}': expected little, big or native")]
    InvalidByteOrder(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Byte order of operand cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOrder {
    Little,
    Big,
}

impl WireOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            WireOrder::Big
        } else {
            WireOrder::Little
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            WireOrder::Little => LittleEndian::read_i16(buf),
            WireOrder::Big => BigEndian::read_i16(buf),
        }
    }

    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            WireOrder::Little => LittleEndian::read_u16(buf),
            WireOrder::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        match self {
            WireOrder::Little => LittleEndian::read_f64(buf),
            WireOrder::Big => BigEndian::read_f64(buf),
        }
    }

    fn put_i16(self, out: &mut Vec<u8>, value: i16) {
        let mut cell = [0u8; CELL_SIZE];
        match self {
            WireOrder::Little => LittleEndian::write_i16(&mut cell, value),
            WireOrder::Big => BigEndian::write_i16(&mut cell, value),
        }
        out.extend_from_slice(&cell);
    }

    fn put_u16(self, out: &mut Vec<u8>, value: u16) {
        self.put_i16(out, value as i16);
    }

    fn put_f64(self, out: &mut Vec<u8>, value: f64) {
        let mut word = [0u8; FRAME_VALUE_SIZE];
        match self {
            WireOrder::Little => LittleEndian::write_f64(&mut word, value),
            WireOrder::Big => BigEndian::write_f64(&mut word, value),
        }
        out.extend_from_slice(&word);
    }
}

impl Default for WireOrder {
    fn default() -> Self {
        WireOrder::native()
    }
}

impl FromStr for WireOrder {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(WireOrder::Little),
            "big" | "be" => Ok(WireOrder::Big),
            "native" => Ok(WireOrder::native()),
            _ => Err(ProtocolError::InvalidByteOrder(s.to_string())),
        }
    }
}

/// Opcode identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Begin,
    End,
    Quit,
    MoveTo,
    LineTo,
    Point,
    LineType,
    LineWidth,
    FilledBox,
    DefineFrame,
    SetColor,
    DefinePalette,
}

impl Opcode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'G' => Some(Opcode::Begin),
            b'E' => Some(Opcode::End),
            b'R' => Some(Opcode::Quit),
            b'M' => Some(Opcode::MoveTo),
            b'V' => Some(Opcode::LineTo),
            b'P' => Some(Opcode::Point),
            b'L' => Some(Opcode::LineType),
            b'W' => Some(Opcode::LineWidth),
            b'B' => Some(Opcode::FilledBox),
            b'U' => Some(Opcode::DefineFrame),
            b'C' => Some(Opcode::SetColor),
            b'S' => Some(Opcode::DefinePalette),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Opcode::Begin => b'G',
            Opcode::End => b'E',
            Opcode::Quit => b'R',
            Opcode::MoveTo => b'M',
            Opcode::LineTo => b'V',
            Opcode::Point => b'P',
            Opcode::LineType => b'L',
            Opcode::LineWidth => b'W',
            Opcode::FilledBox => b'B',
            Opcode::DefineFrame => b'U',
            Opcode::SetColor => b'C',
            Opcode::DefinePalette => b'S',
        }
    }

    /// Operand payload size in bytes
    pub fn operand_len(self) -> usize {
        match self {
            Opcode::Begin | Opcode::End | Opcode::Quit => 0,
            Opcode::LineType | Opcode::LineWidth => CELL_SIZE,
            Opcode::MoveTo | Opcode::LineTo | Opcode::Point => 2 * CELL_SIZE,
            Opcode::SetColor => 3 * CELL_SIZE,
            Opcode::FilledBox => 5 * CELL_SIZE,
            Opcode::DefinePalette => 8 * CELL_SIZE,
            Opcode::DefineFrame => 4 * FRAME_VALUE_SIZE,
        }
    }

    /// Opcode byte plus operands
    pub fn frame_len(self) -> usize {
        1 + self.operand_len()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ('{}')", self, self.as_byte() as char)
    }
}

/// Decoded opcode with typed operands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Begin,
    End,
    Quit,
    MoveTo(DevicePoint),
    LineTo(DevicePoint),
    Point(DevicePoint),
    LineType(i16),
    LineWidth(i16),
    FilledBox {
        shade: i16,
        x_low: i16,
        x_high: i16,
        y_high: i16,
        y_low: i16,
    },
    DefineFrame {
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    },
    SetColor(Rgb16),
    DefinePalette(PaletteDefinition),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Begin => Opcode::Begin,
            Command::End => Opcode::End,
            Command::Quit => Opcode::Quit,
            Command::MoveTo(_) => Opcode::MoveTo,
            Command::LineTo(_) => Opcode::LineTo,
            Command::Point(_) => Opcode::Point,
            Command::LineType(_) => Opcode::LineType,
            Command::LineWidth(_) => Opcode::LineWidth,
            Command::FilledBox { .. } => Opcode::FilledBox,
            Command::DefineFrame { .. } => Opcode::DefineFrame,
            Command::SetColor(_) => Opcode::SetColor,
            Command::DefinePalette(_) => Opcode::DefinePalette,
        }
    }

    /// Append the wire form of this command to `out`.
    pub fn encode(&self, order: WireOrder, out: &mut Vec<u8>) {
        out.push(self.opcode().as_byte());
        match *self {
            Command::Begin | Command::End | Command::Quit => {}
            Command::MoveTo(p) | Command::LineTo(p) | Command::Point(p) => {
                order.put_i16(out, p.x);
                order.put_i16(out, p.y);
            }
            Command::LineType(v) | Command::LineWidth(v) => order.put_i16(out, v),
            Command::FilledBox {
                shade,
                x_low,
                x_high,
                y_high,
                y_low,
            } => {
                for cell in [shade, x_low, x_high, y_high, y_low] {
                    order.put_i16(out, cell);
                }
            }
            Command::DefineFrame {
                x_min,
                y_min,
                x_max,
                y_max,
            } => {
                for value in [x_min, y_min, x_max, y_max] {
                    order.put_f64(out, value);
                }
            }
            Command::SetColor(c) => {
                order.put_u16(out, c.red);
                order.put_u16(out, c.green);
                order.put_u16(out, c.blue);
            }
            Command::DefinePalette(p) => {
                order.put_i16(out, p.entries);
                order.put_i16(out, p.kind);
                for c in [p.start, p.end] {
                    order.put_u16(out, c.red);
                    order.put_u16(out, c.green);
                    order.put_u16(out, c.blue);
                }
            }
        }
    }

    pub fn to_bytes(&self, order: WireOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.opcode().frame_len());
        self.encode(order, &mut out);
        out
    }
}

/// Encode a sequence of commands into one contiguous stream.
pub fn encode_stream(commands: &[Command], order: WireOrder) -> Vec<u8> {
    let mut out = Vec::new();
    for command in commands {
        command.encode(order, &mut out);
    }
    out
}

fn decode_operands(opcode: Opcode, operands: &[u8], order: WireOrder) -> Command {
    let cell = |i: usize| order.read_i16(&operands[i * CELL_SIZE..]);
    let ucell = |i: usize| order.read_u16(&operands[i * CELL_SIZE..]);
    let point = || DevicePoint::new(cell(0), cell(1));
    match opcode {
        Opcode::Begin => Command::Begin,
        Opcode::End => Command::End,
        Opcode::Quit => Command::Quit,
        Opcode::MoveTo => Command::MoveTo(point()),
        Opcode::LineTo => Command::LineTo(point()),
        Opcode::Point => Command::Point(point()),
        Opcode::LineType => Command::LineType(cell(0)),
        Opcode::LineWidth => Command::LineWidth(cell(0)),
        Opcode::FilledBox => Command::FilledBox {
            shade: cell(0),
            x_low: cell(1),
            x_high: cell(2),
            y_high: cell(3),
            y_low: cell(4),
        },
        Opcode::DefineFrame => {
            let value = |i: usize| order.read_f64(&operands[i * FRAME_VALUE_SIZE..]);
            Command::DefineFrame {
                x_min: value(0),
                y_min: value(1),
                x_max: value(2),
                y_max: value(3),
            }
        }
        Opcode::SetColor => Command::SetColor(Rgb16::new(ucell(0), ucell(1), ucell(2))),
        Opcode::DefinePalette => Command::DefinePalette(PaletteDefinition {
            entries: cell(0),
            kind: cell(1),
            start: Rgb16::new(ucell(2), ucell(3), ucell(4)),
            end: Rgb16::new(ucell(5), ucell(6), ucell(7)),
        }),
    }
}

/// Decode the opcode at the head of `bytes`.
///
/// Returns `Ok(None)` when the buffer holds only part of the opcode.
/// `offset` is the stream position of `bytes[0]`, used for diagnostics.
pub fn decode_frame(
    bytes: &[u8],
    order: WireOrder,
    offset: u64,
) -> ProtocolResult<Option<(Command, usize)>> {
    let Some(&byte) = bytes.first() else {
        return Ok(None);
    };
    let opcode = Opcode::from_byte(byte).ok_or(ProtocolError::UnknownOpcode { byte, offset })?;
    let len = opcode.frame_len();
    if bytes.len() < len {
        return Ok(None);
    }
    Ok(Some((decode_operands(opcode, &bytes[1..len], order), len)))
}

/// Iterate over the commands of a complete, well-formed buffer.
pub fn commands(bytes: &[u8], order: WireOrder) -> CommandIter<'_> {
    CommandIter {
        bytes,
        order,
        pos: 0,
    }
}

pub struct CommandIter<'a> {
    bytes: &'a [u8],
    order: WireOrder,
    pos: usize,
}

impl<'a> Iterator for CommandIter<'a> {
    type Item = ProtocolResult<Command>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bytes.len() {
            return None;
        }
        match decode_frame(&self.bytes[self.pos..], self.order, self.pos as u64) {
            Ok(Some((command, len))) => {
                self.pos += len;
                Some(Ok(command))
            }
            Ok(None) => {
                let opcode = Opcode::from_byte(self.bytes[self.pos])?;
                let missing = opcode.frame_len() - (self.bytes.len() - self.pos);
                self.pos = self.bytes.len();
                Some(Err(ProtocolError::Truncated { opcode, missing }))
            }
            Err(e) => {
                self.pos = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}

/// Push-style decoder for streams that arrive in arbitrary chunks.
///
/// Bytes are queued with [`feed`](Self::feed) and whole opcodes are pulled
/// with [`next_opcode`](Self::next_opcode). An opcode split across chunks
/// stays queued until its operands are complete.
#[derive(Debug)]
pub struct FrameDecoder {
    order: WireOrder,
    pending: Vec<u8>,
    head: usize,
    stream_offset: u64,
}

impl FrameDecoder {
    pub fn new(order: WireOrder) -> Self {
        Self {
            order,
            pending: Vec::new(),
            head: 0,
            stream_offset: 0,
        }
    }

    pub fn order(&self) -> WireOrder {
        self.order
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        if self.head > 0 {
            self.pending.drain(..self.head);
            self.head = 0;
        }
        self.pending.extend_from_slice(chunk);
    }

    /// Number of queued bytes not yet decoded
    pub fn buffered(&self) -> usize {
        self.pending.len() - self.head
    }

    /// Pull the next whole opcode, with its raw wire bytes.
    pub fn next_opcode(&mut self) -> ProtocolResult<Option<(Command, &[u8])>> {
        let start = self.head;
        match decode_frame(&self.pending[start..], self.order, self.stream_offset)? {
            Some((command, len)) => {
                self.head += len;
                self.stream_offset += len as u64;
                Ok(Some((command, &self.pending[start..start + len])))
            }
            None => Ok(None),
        }
    }

    /// Signal end of input.
    ///
    /// A stream that stops on an opcode boundary finishes cleanly; one that
    /// stops inside an operand payload is truncated.
    pub fn finish(&mut self) -> ProtocolResult<()> {
        let remaining = self.buffered();
        if remaining == 0 {
            return Ok(());
        }
        let byte = self.pending[self.head];
        let opcode = Opcode::from_byte(byte).ok_or(ProtocolError::UnknownOpcode {
            byte,
            offset: self.stream_offset,
        })?;
        self.pending.clear();
        self.head = 0;
        Err(ProtocolError::Truncated {
            opcode,
            missing: opcode.frame_len() - remaining,
        })
    }
}

/// Result of one [`OpcodeReader::read_next`] call
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// A whole opcode with its raw wire bytes
    Opcode(Command, Vec<u8>),
    /// The source would block before a whole opcode is available
    Incomplete,
    /// The source closed on an opcode boundary
    EndOfStream,
}

/// Pull-style opcode reader over any [`Read`] source.
pub struct OpcodeReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: Read> OpcodeReader<R> {
    pub fn new(inner: R, order: WireOrder) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(order),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    pub fn read_next(&mut self) -> ProtocolResult<ReadOutcome> {
        loop {
            if let Some((command, raw)) = self.decoder.next_opcode()? {
                return Ok(ReadOutcome::Opcode(command, raw.to_vec()));
            }
            match self.inner.read(&mut self.chunk) {
                Ok(0) => {
                    self.decoder.finish()?;
                    return Ok(ReadOutcome::EndOfStream);
                }
                Ok(n) => self.decoder.feed(&self.chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(ReadOutcome::Incomplete),
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// Give up the reader, keeping any bytes buffered past the last opcode.
    pub fn into_decoder(self) -> FrameDecoder {
        self.decoder
    }
}
