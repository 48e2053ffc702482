use crate::jvm::class_file::{
    ClassConstantIndex, ClassReader, Constant, Deserialize, ParseError, ParseErrorKind, Serialize,
    Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::util::{Offset, OffsetVec};
use byteorder::WriteBytesExt;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The body is kept as the exact bytes that were read (or serialized from a structured form when
/// building), so writing a class back out reproduces the input byte-for-byte even for attributes
/// this crate knows nothing about.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Name of the attribute, if the index points to a UTF-8 constant
    pub fn name<'c>(&self, constants: &'c OffsetVec<Constant>) -> Option<&'c str> {
        match constants.get_offset(Offset(self.name_index.0 .0 as usize))? {
            Constant::Utf8(name) => Some(name),
            _ => None,
        }
    }

    /// Decode the body as a structured attribute
    ///
    /// The body must be consumed exactly.
    pub fn parse<A: AttributeLike>(&self) -> Result<A, ParseError> {
        let mut reader = ClassReader::new(&self.info);
        let attribute = reader.read::<A>()?;
        if reader.remaining() > 0 {
            return Err(reader.error(ParseErrorKind::AttributeLengthMismatch {
                declared: self.info.len(),
                consumed: reader.position(),
            }));
        }
        Ok(attribute)
    }

    /// Decode the body if this attribute is named `A::NAME`
    pub fn parse_if<A: AttributeLike>(
        &self,
        constants: &OffsetVec<Constant>,
    ) -> Option<Result<A, ParseError>> {
        if self.name(constants) == Some(A::NAME) {
            Some(self.parse())
        } else {
            None
        }
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let name_index = reader.read()?;
        let len = reader.read_u32("attribute length")? as usize;
        let info = reader.read_bytes(len, "attribute info")?.to_vec();
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes (and read back out of them).
pub trait AttributeLike: Serialize + Deserialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        Ok(Code {
            max_stack: reader.read_u16("max stack")?,
            max_locals: reader.read_u16("max locals")?,
            code_array: reader.read()?,
            exception_table: reader.read()?,
            attributes: reader.read()?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Zero catches everything
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        Ok(ExceptionHandler {
            start_pc: reader.read_u16("start pc")?,
            end_pc: reader.read_u16("end pc")?,
            handler_pc: reader.read_u16("handler pc")?,
            catch_type: reader.read()?,
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

/// Length prefix is `u32` (even though the JVM caps method bodies at 65535 bytes)
impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let len = reader.read_u32("code length")? as usize;
        let bytes = reader.read_bytes(len, "code")?;
        Ok(BytecodeArray(bytes.to_vec()))
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        reader.read().map(StackMapTable)
    }
}

/// Frames built by this crate are always `Full`. The compact variants exist so that tables
/// produced by other compilers can be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    ///
    /// `extended` picks tag 251 even when the delta would fit in the short form (it is forced
    /// for deltas above 63).
    SameLocalsNoStack { offset_delta: u16, extended: bool },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType,
        extended: bool,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with 1 to 3 extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match self {
            StackMapFrame::SameLocalsNoStack { offset_delta, .. }
            | StackMapFrame::SameLocalsOneStack { offset_delta, .. }
            | StackMapFrame::ChopLocalsNoStack { offset_delta, .. }
            | StackMapFrame::AppendLocalsNoStack { offset_delta, .. }
            | StackMapFrame::Full { offset_delta, .. } => *offset_delta,
        }
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack {
                offset_delta,
                extended,
            } => {
                if *offset_delta <= 63 && !extended {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
                extended,
            } => {
                if *offset_delta <= 63 && !extended {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    return Err(invalid_frame("chop frames remove 1-3 locals"));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                if !(1..=3).contains(&locals.len()) {
                    return Err(invalid_frame("append frames add 1-3 locals"));
                }
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

fn invalid_frame(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

impl Deserialize for StackMapFrame {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let tag_offset = reader.position();
        let frame = match reader.read_u8("frame type")? {
            tag @ 0..=63 => StackMapFrame::SameLocalsNoStack {
                offset_delta: tag as u16,
                extended: false,
            },
            tag @ 64..=127 => StackMapFrame::SameLocalsOneStack {
                offset_delta: (tag - 64) as u16,
                stack: reader.read()?,
                extended: false,
            },
            247 => StackMapFrame::SameLocalsOneStack {
                offset_delta: reader.read_u16("offset delta")?,
                stack: reader.read()?,
                extended: true,
            },
            tag @ 248..=250 => StackMapFrame::ChopLocalsNoStack {
                offset_delta: reader.read_u16("offset delta")?,
                chopped_k: 251 - tag,
            },
            251 => StackMapFrame::SameLocalsNoStack {
                offset_delta: reader.read_u16("offset delta")?,
                extended: true,
            },
            tag @ 252..=254 => {
                let offset_delta = reader.read_u16("offset delta")?;
                let mut locals = Vec::with_capacity((tag - 251) as usize);
                for _ in 251..tag {
                    locals.push(reader.read()?);
                }
                StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals,
                }
            }
            255 => StackMapFrame::Full {
                offset_delta: reader.read_u16("offset delta")?,
                locals: reader.read()?,
                stack: reader.read()?,
            },
            other => {
                return Err(reader.error_at(tag_offset, ParseErrorKind::UnknownFrameType(other)))
            }
        };
        Ok(frame)
    }
}
