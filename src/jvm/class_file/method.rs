use crate::jvm::class_file::{
    Attribute, ClassReader, Code, Constant, Deserialize, ParseError, Serialize, Utf8ConstantIndex,
};
use crate::jvm::MethodAccessFlags;
use crate::util::OffsetVec;
use byteorder::WriteBytesExt;

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    /// Decode the `Code` attribute, if the method has one
    pub fn code(&self, constants: &OffsetVec<Constant>) -> Option<Result<Code, ParseError>> {
        self.attributes
            .iter()
            .find_map(|attribute| attribute.parse_if::<Code>(constants))
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        Ok(Method {
            access_flags: reader.read()?,
            name_index: reader.read()?,
            descriptor_index: reader.read()?,
            attributes: reader.read()?,
        })
    }
}
