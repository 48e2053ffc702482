use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, ClassReader, Constant, Deserialize, Field, Method, ParseError,
    ParseErrorKind, Serialize, Utf8ConstantIndex, Version,
};
use crate::jvm::ClassAccessFlags;
use crate::util::{Offset, OffsetVec};
use byteorder::WriteBytesExt;
use std::fs;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// Every index inside refers to `constants`: the model is self-contained.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Read a class file, requiring that the whole input is consumed
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ParseError> {
        let mut reader = ClassReader::new(bytes);
        let class = reader.read::<ClassFile>()?;
        reader.finish()?;
        Ok(class)
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Look up a UTF-8 constant
    pub fn lookup_utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.constants.get_offset(Offset(index.0 .0 as usize))? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Binary name of a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Option<&str> {
        match self.constants.get_offset(Offset(index.0 .0 as usize))? {
            Constant::Class(name) => self.lookup_utf8(*name),
            _ => None,
        }
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> std::io::Result<()> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut class_file = std::io::BufWriter::new(fs::File::create(path)?);
        self.serialize(&mut class_file)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        writer.flush()
    }
}

impl Deserialize for ClassFile {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let magic = reader.read_u32("magic")?;
        if magic != u32::from_be_bytes(ClassFile::MAGIC) {
            return Err(reader.error_at(0, ParseErrorKind::BadMagic(magic)));
        }
        Ok(ClassFile {
            version: reader.read()?,
            constants: reader.read()?,
            access_flags: reader.read()?,
            this_class: reader.read()?,
            super_class: reader.read()?,
            interfaces: reader.read()?,
            fields: reader.read()?,
            methods: reader.read()?,
            attributes: reader.read()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// `public class Empty extends java/lang/Object {}` with no members
    const EMPTY: [u8; 34] = [
        0xCA, 0xFE, 0xBA, 0xBE, // magic
        0, 0, 0, 52, // version
        0, 5, // constant pool count
        1, 0, 5, b'E', b'm', b'p', b't', b'y', // #1
        7, 0, 1, // #2
        1, 0, 1, b'O', // #3
        7, 0, 3, // #4
        0, 0x21, // flags
        0, 2, 0, 4, // this, super
    ];

    fn empty_class() -> Vec<u8> {
        let mut bytes = EMPTY.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
        bytes
    }

    #[test]
    fn parse_minimal_class() {
        let bytes = empty_class();
        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.version, Version::JAVA8);
        assert_eq!(class.class_name(class.this_class), Some("Empty"));
        assert_eq!(class.class_name(class.super_class), Some("O"));
        assert_eq!(
            class.access_flags,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER
        );
        assert_eq!(class.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = empty_class();
        bytes[3] = 0xBF;
        assert_eq!(
            ClassFile::parse(&bytes),
            Err(ParseError {
                offset: 0,
                kind: ParseErrorKind::BadMagic(0xCAFEBABF),
            })
        );
    }

    #[test]
    fn truncated_and_overlong_input() {
        let bytes = empty_class();
        let truncated = ClassFile::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            truncated.kind,
            ParseErrorKind::UnexpectedEof {
                field: "sequence length"
            }
        );

        let mut overlong = bytes;
        overlong.push(0);
        assert_eq!(
            ClassFile::parse(&overlong).unwrap_err().kind,
            ParseErrorKind::TrailingBytes(1)
        );
    }
}
