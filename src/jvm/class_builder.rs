use crate::jvm::class_file::{
    Attribute, AttributeLike, ClassConstantIndex, ClassFile, ConstantsPool, Field, Method, Version,
};
use crate::jvm::code::MethodBuilder;
use crate::jvm::{
    ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor,
    ParseDescriptor,
};
use crate::util::OffsetVec;

/// Accumulates the members of one class along with the constant pool they share
///
/// The builder is the only owner of the pool: method bodies borrow it through
/// [`ClassBuilder::constants_mut`] while they are being built, then hand back their attributes.
pub struct ClassBuilder {
    /// Class file, but with `constants` left blank
    class: ClassFile,

    /// Constants pool
    constants_pool: ConstantsPool,
}

impl ClassBuilder {
    /// Create a new class builder
    ///
    /// Class names are binary names (eg. `java/lang/Object`).
    pub fn new<S: AsRef<str>>(
        access_flags: ClassAccessFlags,
        this_class: S,
        super_class: S,
        interfaces: &[S],
    ) -> Result<ClassBuilder, Error> {
        let mut constants = ConstantsPool::new();
        let this_class = constants.get_class_named(this_class)?;
        let super_class = constants.get_class_named(super_class)?;
        let interfaces = interfaces
            .iter()
            .map(|interface| constants.get_class_named(interface))
            .collect::<Result<_, _>>()?;

        let class = ClassFile {
            version: Version::default(),
            constants: OffsetVec::new(),
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        };

        Ok(ClassBuilder {
            class,
            constants_pool: constants,
        })
    }

    /// Override the class file version (defaults to Java 8)
    pub fn set_version(&mut self, version: Version) {
        self.class.version = version;
    }

    pub fn this_class(&self) -> ClassConstantIndex {
        self.class.this_class
    }

    /// Pool shared by every member of the class
    pub fn constants_mut(&mut self) -> &mut ConstantsPool {
        &mut self.constants_pool
    }

    /// Start building the body of a method with the given signature
    ///
    /// Non-static methods get `this` as their first local.
    pub fn method_builder(
        &mut self,
        is_static: bool,
        descriptor: &MethodDescriptor,
    ) -> Result<MethodBuilder, Error> {
        let this_class = if is_static {
            None
        } else {
            Some(self.class.this_class)
        };
        MethodBuilder::from_descriptor(&mut self.constants_pool, descriptor, this_class)
    }

    /// Consume the builder and return the finished class file
    pub fn result(mut self) -> ClassFile {
        log::debug!(
            "class has {} constants, {} fields, {} methods",
            self.constants_pool.len(),
            self.class.fields.len(),
            self.class.methods.len()
        );
        self.class.constants = self.constants_pool.into_offset_vec();
        self.class
    }

    /// Add an attribute to the class
    pub fn add_attribute(&mut self, attribute: impl AttributeLike) -> Result<(), Error> {
        let attribute = self.constants_pool.get_attribute(attribute)?;
        self.class.attributes.push(attribute);
        Ok(())
    }

    /// Add a field to the class
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<(), Error> {
        FieldType::parse(descriptor).map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
        let name_index = self.constants_pool.get_utf8(name)?;
        let descriptor_index = self.constants_pool.get_utf8(descriptor)?;

        self.class.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        Ok(())
    }

    /// Add a method to the class
    ///
    /// `attributes` is typically the output of [`MethodBuilder::finish`] (empty for abstract
    /// methods).
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        attributes: Vec<Attribute>,
    ) -> Result<(), Error> {
        MethodDescriptor::parse(descriptor)
            .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
        let name_index = self.constants_pool.get_utf8(name)?;
        let descriptor_index = self.constants_pool.get_utf8(descriptor)?;

        self.class.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        });
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Constant;

    #[test]
    fn names_share_the_pool() {
        let mut builder = ClassBuilder::new(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            "me/Point",
            "java/lang/Object",
            &["java/lang/Cloneable"],
        )
        .unwrap();
        builder
            .add_field(FieldAccessFlags::PUBLIC, "x", "I")
            .unwrap();
        builder
            .add_field(FieldAccessFlags::PUBLIC, "y", "I")
            .unwrap();
        builder
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                "norm",
                "()D",
                vec![],
            )
            .unwrap();
        builder.set_version(Version::JAVA11);

        let class = builder.result();
        assert_eq!(class.version, Version::JAVA11);
        assert_eq!(class.class_name(class.this_class), Some("me/Point"));
        assert_eq!(class.class_name(class.interfaces[0]), Some("java/lang/Cloneable"));
        assert_eq!(class.fields[0].descriptor_index, class.fields[1].descriptor_index);
        let utf8_count = class
            .constants
            .iter()
            .filter(|(_, constant)| matches!(constant, Constant::Utf8(_)))
            .count();
        // me/Point, java/lang/Object, java/lang/Cloneable, x, I, y, norm, ()D
        assert_eq!(utf8_count, 8);
    }

    #[test]
    fn descriptors_are_checked() {
        let mut builder =
            ClassBuilder::new(ClassAccessFlags::PUBLIC, "A", "java/lang/Object", &[]).unwrap();
        assert!(matches!(
            builder.add_field(FieldAccessFlags::PUBLIC, "x", "(I)V"),
            Err(Error::BadDescriptor(_))
        ));
        assert!(matches!(
            builder.add_method(MethodAccessFlags::STATIC, "f", "I", vec![]),
            Err(Error::BadDescriptor(_))
        ));
    }
}
