use crate::jvm::class_file::{
    ClassConstantIndex, ClassReader, Deserialize, ParseError, ParseErrorKind, Serialize,
};
use crate::util::Width;
use byteorder::WriteBytesExt;

/// These types are from [this hierarchy][0]
///
/// Object types are already resolved to class constants: the builders always have the pool at hand,
/// and this is the form that ends up in stack map frames.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Unusable slot (eg. a local that has not been written yet)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(ClassConstantIndex),

    /// State of an object after `new` has been called but `<init>` has not been called, along
    /// with the offset of the `new` instruction from the start of the method body
    Uninitialized(u16),
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Check if one verification type is assignable to another
    ///
    /// There is no class hierarchy available here, so objects are only assignable to the exact
    /// same class.
    pub fn is_assignable(sub_type: &Self, super_type: &Self) -> bool {
        match (sub_type, super_type) {
            (_, Self::Top) => true,
            (Self::Null, Self::Object(_)) => true,
            (t1, t2) => t1 == t2,
        }
    }

    /// Tag byte used in the `verification_type_info` union
    pub fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }
}

impl Serialize for VerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(cls) => cls.serialize(writer)?,
            VerificationType::Uninitialized(off) => off.serialize(writer)?,
            _ => (),
        };
        Ok(())
    }
}

impl Deserialize for VerificationType {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let offset = reader.position();
        let vtype = match reader.read_u8("verification type tag")? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(reader.read()?),
            8 => VerificationType::Uninitialized(reader.read_u16("uninitialized offset")?),
            other => {
                return Err(
                    reader.error_at(offset, ParseErrorKind::UnknownVerificationTag(other))
                )
            }
        };
        Ok(vtype)
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;

    #[test]
    fn null_is_assignable_to_objects() {
        let string = VerificationType::Object(ClassConstantIndex(ConstantIndex(4)));
        let object = VerificationType::Object(ClassConstantIndex(ConstantIndex(6)));
        assert!(VerificationType::is_assignable(&VerificationType::Null, &string));
        assert!(VerificationType::is_assignable(&string, &string));
        assert!(!VerificationType::is_assignable(&string, &object));
        assert!(!VerificationType::is_assignable(&string, &VerificationType::Null));
        assert!(!VerificationType::is_assignable(
            &VerificationType::Integer,
            &VerificationType::Float
        ));
    }

    #[test]
    fn encoding() {
        let types = vec![
            VerificationType::Top,
            VerificationType::Long,
            VerificationType::Object(ClassConstantIndex(ConstantIndex(0x0102))),
            VerificationType::Uninitialized(9),
        ];
        let mut bytes = vec![];
        for vtype in &types {
            vtype.serialize(&mut bytes).unwrap();
        }
        assert_eq!(bytes, vec![0, 4, 7, 1, 2, 8, 0, 9]);

        let mut reader = ClassReader::new(&bytes);
        for vtype in &types {
            assert_eq!(&reader.read::<VerificationType>().unwrap(), vtype);
        }
        assert_eq!(reader.finish(), Ok(()));
    }

    #[test]
    fn unknown_tag() {
        let mut reader = ClassReader::new(&[9]);
        assert_eq!(
            reader.read::<VerificationType>(),
            Err(ParseError {
                offset: 0,
                kind: ParseErrorKind::UnknownVerificationTag(9),
            })
        );
    }
}
