use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Cursor over the bytes of a class file (or of one attribute body)
///
/// Reads are strictly left-to-right and big-endian. Every read names the field being read so
/// that a truncated input produces an error pointing at both the byte offset and the field.
pub struct ClassReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ClassReader<'a> {
        ClassReader {
            cursor: Cursor::new(bytes),
        }
    }

    /// Offset of the next byte to be read
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Number of bytes not yet read
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    /// Construct an error located at the current position
    pub fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            offset: self.position(),
            kind,
        }
    }

    /// Construct an error located at an earlier position
    pub fn error_at(&self, offset: usize, kind: ParseErrorKind) -> ParseError {
        ParseError { offset, kind }
    }

    fn eof(&self, start: usize, field: &'static str) -> ParseError {
        ParseError {
            offset: start,
            kind: ParseErrorKind::UnexpectedEof { field },
        }
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, ParseError> {
        let start = self.position();
        self.cursor.read_u8().map_err(|_| self.eof(start, field))
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, ParseError> {
        let start = self.position();
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ParseError> {
        let start = self.position();
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, ParseError> {
        let start = self.position();
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    pub fn read_i16(&mut self, field: &'static str) -> Result<i16, ParseError> {
        let start = self.position();
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, ParseError> {
        let start = self.position();
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64, ParseError> {
        let start = self.position();
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| self.eof(start, field))
    }

    /// IEEE-754 single, kept bit-for-bit (including `NaN` payloads)
    pub fn read_f32(&mut self, field: &'static str) -> Result<f32, ParseError> {
        self.read_u32(field).map(f32::from_bits)
    }

    /// IEEE-754 double, kept bit-for-bit (including `NaN` payloads)
    pub fn read_f64(&mut self, field: &'static str) -> Result<f64, ParseError> {
        self.read_u64(field).map(f64::from_bits)
    }

    /// Read a fixed number of raw bytes
    pub fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], ParseError> {
        let start = self.position();
        if self.remaining() < len {
            return Err(self.eof(start, field));
        }
        let bytes: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&bytes[start..start + len])
    }

    /// Read anything that knows how to deserialize itself
    pub fn read<T: Deserialize>(&mut self) -> Result<T, ParseError> {
        T::deserialize(self)
    }

    /// Consume the reader, checking that every byte was read
    pub fn finish(self) -> Result<(), ParseError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(self.error(ParseErrorKind::TrailingBytes(extra))),
        }
    }
}

/// Inverse of [`super::Serialize`]
pub trait Deserialize: Sized {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError>;
}

impl Deserialize for u8 {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        reader.read_u8("u1")
    }
}

impl Deserialize for u16 {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        reader.read_u16("u2")
    }
}

/// Size in `u16` is the first thing deserialized
impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let len = reader.read_u16("sequence length")?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Binary-format error: the input is corrupt or uses something this reader does not support
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Byte offset (from the start of the buffer being read) at which the problem was detected
    pub offset: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    BadMagic(u32),
    UnknownConstantTag(u8),
    UnknownHandleKind(u8),
    UnknownVerificationTag(u8),
    UnknownFrameType(u8),
    UnexpectedEof { field: &'static str },
    TrailingBytes(usize),
    InvalidModifiedUtf8,

    /// A `long` or `double` straddles the declared end of the constant pool
    ConstantPoolCountMismatch { declared: u16, actual: usize },

    /// A structured attribute body did not consume exactly its declared length
    AttributeLengthMismatch { declared: usize, consumed: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at byte {}: ", self.offset)?;
        match &self.kind {
            ParseErrorKind::BadMagic(magic) => write!(f, "bad magic header 0x{:08x}", magic),
            ParseErrorKind::UnknownConstantTag(tag) => write!(f, "unknown constant tag {}", tag),
            ParseErrorKind::UnknownHandleKind(kind) => write!(f, "unknown handle kind {}", kind),
            ParseErrorKind::UnknownVerificationTag(tag) => {
                write!(f, "unknown verification type tag {}", tag)
            }
            ParseErrorKind::UnknownFrameType(tag) => write!(f, "unknown frame type {}", tag),
            ParseErrorKind::UnexpectedEof { field } => write!(f, "input ends inside {}", field),
            ParseErrorKind::TrailingBytes(n) => write!(f, "{} unread trailing bytes", n),
            ParseErrorKind::InvalidModifiedUtf8 => write!(f, "invalid modified UTF-8"),
            ParseErrorKind::ConstantPoolCountMismatch { declared, actual } => write!(
                f,
                "constant pool count {} does not line up with entries (reached {})",
                declared, actual
            ),
            ParseErrorKind::AttributeLengthMismatch { declared, consumed } => write!(
                f,
                "attribute declares {} bytes but its body is {} bytes",
                declared, consumed
            ),
        }
    }
}

impl std::error::Error for ParseError {}
