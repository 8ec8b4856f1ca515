//! Framed fixed-point wire protocol shared with the planner.
//!
//! Frames are 4-byte ASCII commands with no length prefix or delimiter.
//! Scalars travel as little-endian signed 64-bit integers scaled by 10⁶;
//! booleans as 0/1 in the same slot; lengths, minute offsets and the step
//! size as raw (unscaled) integers.

use std::{
    fmt::{self, Display, Formatter},
    io::{ErrorKind, Read, Write},
};

const FIXED_POINT_SCALE: f64 = 1_000_000.0;

/// A 4-byte command frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Command(pub [u8; 4]);

impl Command {
    pub const DONE: Self = Self(*b"DONE");
    pub const INIT: Self = Self(*b"INIT");
    pub const OKAY: Self = Self(*b"OKAY");
    pub const PING: Self = Self(*b"PING");
    pub const PONG: Self = Self(*b"PONG");
    pub const PRED: Self = Self(*b"PRED");
    pub const QUIT: Self = Self(*b"QUIT");
}

impl Display for Command {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Any of these terminates the session; there is no in-band recovery.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("stream ended before the frame was complete")]
    TruncatedStream,

    #[error("unexpected command `{actual}`, expected `{expected}`")]
    UnexpectedCommand { expected: Command, actual: Command },

    #[error("unknown command `{0}`")]
    UnknownCommand(Command),

    #[error("invalid array length {0}")]
    InvalidLength(i64),

    #[error("invalid simulation step {0}, expected a positive multiple of 5")]
    InvalidStep(i64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn map_read_error(error: std::io::Error) -> ProtocolError {
    if error.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::TruncatedStream
    } else {
        ProtocolError::Io(error)
    }
}

/// Reading side of the wire.
pub struct Decoder<R> {
    reader: R,
}

impl<R: Read> Decoder<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_command(&mut self) -> Result<Command, ProtocolError> {
        let mut frame = [0_u8; 4];
        self.reader.read_exact(&mut frame).map_err(map_read_error)?;
        Ok(Command(frame))
    }

    /// Read a command and fail unless it is the expected one.
    pub fn expect_command(&mut self, expected: Command) -> Result<(), ProtocolError> {
        let actual = self.read_command()?;
        if actual == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedCommand { expected, actual })
        }
    }

    /// Read a raw (unscaled) integer slot.
    pub fn read_int(&mut self) -> Result<i64, ProtocolError> {
        let mut buffer = [0_u8; 8];
        self.reader.read_exact(&mut buffer).map_err(map_read_error)?;
        Ok(i64::from_le_bytes(buffer))
    }

    /// Read a raw integer slot and validate it as an array length.
    pub fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let value = self.read_int()?;
        usize::try_from(value).map_err(|_| ProtocolError::InvalidLength(value))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_int()? != 0)
    }

    #[expect(clippy::cast_precision_loss)]
    pub fn read_scalar(&mut self) -> Result<f64, ProtocolError> {
        Ok(self.read_int()? as f64 / FIXED_POINT_SCALE)
    }

    /// Read a bare sequence of scalars of a known length.
    pub fn read_array(&mut self, len: usize) -> Result<Vec<f64>, ProtocolError> {
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(self.read_scalar()?);
        }
        Ok(values)
    }
}

/// Writing side of the wire.
pub struct Encoder<W> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_command(&mut self, command: Command) -> Result<(), ProtocolError> {
        Ok(self.writer.write_all(&command.0)?)
    }

    pub fn write_int(&mut self, value: i64) -> Result<(), ProtocolError> {
        Ok(self.writer.write_all(&value.to_le_bytes())?)
    }

    /// Scale and truncate toward zero, mirroring the decoding division.
    #[expect(clippy::cast_possible_truncation)]
    pub fn write_scalar(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.write_int((value * FIXED_POINT_SCALE) as i64)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_int(i64::from(value))
    }

    pub fn write_array(&mut self, values: &[f64]) -> Result<(), ProtocolError> {
        for &value in values {
            self.write_scalar(value)?;
        }
        Ok(())
    }

    /// The planner blocks on responses, so every frame is flushed out.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        Ok(self.writer.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer);
        for value in [0.0, 1.234_567, -42.5, 1e6, -1e6, 0.000_001] {
            encoder.write_scalar(value).unwrap();
        }

        let mut decoder = Decoder::new(buffer.as_slice());
        for value in [0.0, 1.234_567, -42.5, 1e6, -1e6, 0.000_001] {
            assert!((decoder.read_scalar().unwrap() - value).abs() < 1e-6);
        }
    }

    #[test]
    fn test_int_is_not_scaled() {
        let mut buffer = Vec::new();
        Encoder::new(&mut buffer).write_int(17).unwrap();
        assert_eq!(Decoder::new(buffer.as_slice()).read_int().unwrap(), 17);
    }

    #[test]
    fn test_bool_round_trip() {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer);
        encoder.write_bool(true).unwrap();
        encoder.write_bool(false).unwrap();

        let mut decoder = Decoder::new(buffer.as_slice());
        assert!(decoder.read_bool().unwrap());
        assert!(!decoder.read_bool().unwrap());
    }

    #[test]
    fn test_command_round_trip() {
        let mut buffer = Vec::new();
        Encoder::new(&mut buffer).write_command(Command::PING).unwrap();
        assert_eq!(Decoder::new(buffer.as_slice()).read_command().unwrap(), Command::PING);
    }

    #[test]
    fn test_truncated_stream() {
        // 8 bytes expected, 3 provided:
        let mut decoder = Decoder::new([1_u8, 2, 3].as_slice());
        assert!(matches!(decoder.read_scalar(), Err(ProtocolError::TruncatedStream)));
    }

    #[test]
    fn test_unexpected_command() {
        let mut buffer = Vec::new();
        Encoder::new(&mut buffer).write_command(Command::PING).unwrap();
        let result = Decoder::new(buffer.as_slice()).expect_command(Command::INIT);
        assert!(matches!(result, Err(ProtocolError::UnexpectedCommand { .. })));
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut buffer = Vec::new();
        Encoder::new(&mut buffer).write_int(-1).unwrap();
        let result = Decoder::new(buffer.as_slice()).read_len();
        assert!(matches!(result, Err(ProtocolError::InvalidLength(-1))));
    }
}
