use crate::jvm::class_file::{ClassReader, Deserialize, ParseError, ParseErrorKind, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::hash::{Hash, Hasher};

/// Constants as in the constant pool
///
/// Equality and hashing are structural over `(tag, payload)`. Floating point payloads compare by
/// their bit patterns, so `0.0` and `-0.0` (or two `NaN`s with different payloads) are different
/// constants.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (see [`encode_modified_utf8`]).
    Utf8(String),

    /// Constant string that is not valid Unicode, as UTF-16 code units
    ///
    /// Modified UTF-8 can encode unpaired surrogates (eg. from the Java literal `"\uD800"`), which
    /// a `String` cannot hold. Entries read from a class file only end up here when they do not
    /// decode to a `String`, so the same text never has two representations.
    Utf16(Vec<u16>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// `FieldRef` for the field handle kinds, `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module (only valid in `module-info` classes)
    Module(Utf8ConstantIndex),

    /// Package exported or opened by a module
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// String constant from UTF-16 code units, as a [`Constant::Utf8`] whenever they are valid
    /// Unicode
    pub fn from_utf16(units: Vec<u16>) -> Constant {
        match String::from_utf16(&units) {
            Ok(string) => Constant::Utf8(string),
            Err(_) => Constant::Utf16(units),
        }
    }

    /// Tag byte that prefixes this constant in the class file
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) | Constant::Utf16(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef(_, _) => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true, ..
            } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Constant) -> bool {
        use Constant::*;
        match (self, other) {
            (Class(a), Class(b)) => a == b,
            (FieldRef(c1, nt1), FieldRef(c2, nt2)) => c1 == c2 && nt1 == nt2,
            (
                MethodRef {
                    class: c1,
                    name_and_type: nt1,
                    is_interface: i1,
                },
                MethodRef {
                    class: c2,
                    name_and_type: nt2,
                    is_interface: i2,
                },
            ) => c1 == c2 && nt1 == nt2 && i1 == i2,
            (String(a), String(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (
                NameAndType {
                    name: n1,
                    descriptor: d1,
                },
                NameAndType {
                    name: n2,
                    descriptor: d2,
                },
            ) => n1 == n2 && d1 == d2,
            (Utf8(a), Utf8(b)) => a == b,
            (Utf16(a), Utf16(b)) => a == b,
            (
                MethodHandle {
                    handle_kind: k1,
                    member: m1,
                },
                MethodHandle {
                    handle_kind: k2,
                    member: m2,
                },
            ) => k1 == k2 && m1 == m2,
            (MethodType { descriptor: a }, MethodType { descriptor: b }) => a == b,
            (
                Dynamic {
                    bootstrap_method: b1,
                    name_and_type: nt1,
                },
                Dynamic {
                    bootstrap_method: b2,
                    name_and_type: nt2,
                },
            ) => b1 == b2 && nt1 == nt2,
            (
                InvokeDynamic {
                    bootstrap_method: b1,
                    method_descriptor: nt1,
                },
                InvokeDynamic {
                    bootstrap_method: b2,
                    method_descriptor: nt2,
                },
            ) => b1 == b2 && nt1 == nt2,
            (Module(a), Module(b)) => a == b,
            (Package(a), Package(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Constant::Class(name) | Constant::Module(name) | Constant::Package(name) => {
                name.hash(state)
            }
            Constant::String(utf8) => utf8.hash(state),
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.hash(state);
                name_and_type.hash(state);
            }
            Constant::Integer(integer) => integer.hash(state),
            Constant::Float(float) => float.to_bits().hash(state),
            Constant::Long(long) => long.hash(state),
            Constant::Double(double) => double.to_bits().hash(state),
            Constant::NameAndType { name, descriptor } => {
                name.hash(state);
                descriptor.hash(state);
            }
            Constant::Utf8(string) => string.hash(state),
            Constant::Utf16(units) => units.hash(state),
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.hash(state);
                member.hash(state);
            }
            Constant::MethodType { descriptor } => descriptor.hash(state),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor: name_and_type,
            } => {
                bootstrap_method.hash(state);
                name_and_type.hash(state);
            }
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Utf16(units) => {
                let buffer: Vec<u8> = encode_modified_utf8_units(units);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => integer.serialize(writer)?,
            Constant::Float(float) => float.serialize(writer)?,
            Constant::Long(long) => long.serialize(writer)?,
            Constant::Double(double) => double.serialize(writer)?,
            Constant::Class(name) | Constant::Module(name) | Constant::Package(name) => {
                name.serialize(writer)?
            }
            Constant::String(utf8) => utf8.serialize(writer)?,
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => descriptor.serialize(writer)?,
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor: name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let tag_offset = reader.position();
        let constant = match reader.read_u8("constant tag")? {
            1 => {
                let len = reader.read_u16("utf8 length")? as usize;
                let bytes_offset = reader.position();
                let bytes = reader.read_bytes(len, "utf8 bytes")?;
                let units = decode_modified_utf8_units(bytes).ok_or_else(|| {
                    reader.error_at(bytes_offset, ParseErrorKind::InvalidModifiedUtf8)
                })?;
                Constant::from_utf16(units)
            }
            3 => Constant::Integer(reader.read_i32("integer constant")?),
            4 => Constant::Float(reader.read_f32("float constant")?),
            5 => Constant::Long(reader.read_i64("long constant")?),
            6 => Constant::Double(reader.read_f64("double constant")?),
            7 => Constant::Class(reader.read()?),
            8 => Constant::String(reader.read()?),
            9 => Constant::FieldRef(reader.read()?, reader.read()?),
            tag @ 10..=11 => Constant::MethodRef {
                class: reader.read()?,
                name_and_type: reader.read()?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: reader.read()?,
                descriptor: reader.read()?,
            },
            15 => Constant::MethodHandle {
                handle_kind: reader.read()?,
                member: reader.read()?,
            },
            16 => Constant::MethodType {
                descriptor: reader.read()?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: reader.read_u16("bootstrap method index")?,
                name_and_type: reader.read()?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: reader.read_u16("bootstrap method index")?,
                method_descriptor: reader.read()?,
            },
            19 => Constant::Module(reader.read()?),
            20 => Constant::Package(reader.read()?),
            other => {
                return Err(reader.error_at(tag_offset, ParseErrorKind::UnknownConstantTag(other)))
            }
        };
        Ok(constant)
    }
}

/// The pool count is the offset length, so it includes the unusable slot after every `long` and
/// `double` entry. Indexing starts at 1.
impl Deserialize for OffsetVec<Constant> {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let count_offset = reader.position();
        let count = reader.read_u16("constant pool count")?;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count as usize {
            constants.push(reader.read::<Constant>()?);
        }
        if constants.offset_len().0 != count as usize {
            return Err(reader.error_at(
                count_offset,
                ParseErrorKind::ConstantPoolCountMismatch {
                    declared: count,
                    actual: constants.offset_len().0,
                },
            ));
        }
        Ok(constants)
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the class file format documentation:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for c in string.chars() {
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: high surrogate then low surrogate, each in 3 bytes
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push((code >> 6 & 0x0F) as u8 | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Modified UTF-8 encoding of arbitrary UTF-16 code units, unpaired surrogates included
///
/// For valid Unicode this agrees with [`encode_modified_utf8`].
pub fn encode_modified_utf8_units(units: &[u16]) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(units.len());
    for &unit in units {
        match unit {
            0x01..=0x7F => buffer.push(unit as u8),
            0x00 | 0x80..=0x7FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8_units`]
///
/// Decoding is strict: any byte sequence that the encoder would not produce (raw `0x00`, overlong
/// forms, 4-byte forms, truncated sequences) is rejected, so a successful decode always re-encodes
/// to the exact same bytes. Surrogates are passed through as they are, paired or not.
pub fn decode_modified_utf8_units(bytes: &[u8]) -> Option<Vec<u16>> {
    fn continuation(byte: Option<&u8>) -> Option<u16> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
            _ => None,
        }
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        let unit: u16 = match b {
            0x01..=0x7F => b as u16,
            0b1100_0000..=0b1101_1111 => {
                let unit = (b as u16 & 0x1F) << 6 | continuation(iter.next())?;
                if unit != 0 && unit < 0x80 {
                    return None;
                }
                unit
            }
            0b1110_0000..=0b1110_1111 => {
                let unit = (b as u16 & 0x0F) << 12
                    | continuation(iter.next())? << 6
                    | continuation(iter.next())?;
                if unit < 0x800 {
                    return None;
                }
                unit
            }
            _ => return None,
        };
        units.push(unit);
    }
    Some(units)
}

/// Inverse of [`encode_modified_utf8`]
///
/// On top of the strictness of [`decode_modified_utf8_units`], this rejects unpaired surrogates
/// since a `String` cannot hold them.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    String::from_utf16(&decode_modified_utf8_units(bytes)?).ok()
}


#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

macro_rules! typed_constant_index {
    ($($(#[$attr:meta])* $name:ident;)*) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $name {
                fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
                    reader.read().map($name)
                }
            }
        )*
    };
}

typed_constant_index! {
    /// Index of a `CONSTANT_Utf8_info`
    Utf8ConstantIndex;
    /// Index of a `CONSTANT_String_info`
    StringConstantIndex;
    /// Index of a `CONSTANT_NameAndType_info`
    NameAndTypeConstantIndex;
    /// Index of a `CONSTANT_Class_info`
    ClassConstantIndex;
    /// Index of a `CONSTANT_Fieldref_info`
    FieldRefConstantIndex;
    /// Index of a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    MethodRefConstantIndex;
    /// Index of a `CONSTANT_InvokeDynamic_info`
    InvokeDynamicConstantIndex;
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        reader.read_u16("constant index").map(ConstantIndex)
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn reference_kind(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    pub fn from_reference_kind(kind: u8) -> Option<HandleKind> {
        let handle_kind = match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        };
        Some(handle_kind)
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.reference_kind().serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let offset = reader.position();
        let kind = reader.read_u8("method handle kind")?;
        HandleKind::from_reference_kind(kind)
            .ok_or_else(|| reader.error_at(offset, ParseErrorKind::UnknownHandleKind(kind)))
    }
}
