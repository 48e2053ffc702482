use crate::jvm::class_file::{ClassReader, Deserialize, ParseError, Serialize};
use byteorder::WriteBytesExt;

/// Version of the class file, which is used to verify that the JVM has the
/// necessary features to interpret the class
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    /// JVM class file version corresponding to Java SE 8 (released March 2014)
    ///
    /// This is the first version where `StackMapTable` is mandatory for every method.
    pub const JAVA8: Version = Version {
        major_version: 52,
        minor_version: 0,
    };

    /// JVM class file version corresponding to Java SE 11 (released September 2018)
    pub const JAVA11: Version = Version {
        major_version: 55,
        minor_version: 0,
    };
}

impl Default for Version {
    fn default() -> Version {
        Version::JAVA8
    }
}

/// Minor version comes first in the binary format
impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize(reader: &mut ClassReader<'_>) -> Result<Self, ParseError> {
        let minor_version = reader.read_u16("minor version")?;
        let major_version = reader.read_u16("major version")?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn versions_are_ordered_by_major_first() {
        assert!(Version::JAVA8 < Version::JAVA11);
        let mut bytes = vec![];
        Version::JAVA11.serialize(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 55]);
    }
}
