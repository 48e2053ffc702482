use crate::jvm::class_file::{
    Attribute, AttributeLike, ClassConstantIndex, Constant, ConstantIndex, FieldRefConstantIndex,
    HandleKind, InvokeDynamicConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex,
    Serialize, StringConstantIndex, Utf8ConstantIndex,
};
use crate::jvm::{Error, FieldRef, MethodRef, RenderDescriptor};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::WriteBytesExt;
use std::collections::HashMap;

/// Constant pool for one class
///
/// The pool is append-only: constants are never removed and indices are never reused. Every
/// insertion goes through [`ConstantsPool::intern`], which returns the existing index when a
/// structurally equal constant is already present.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    interned: HashMap<Constant, ConstantIndex>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            interned: HashMap::new(),
        }
    }

    /// Reopen the constants of an existing class for further interning
    ///
    /// Existing entries keep their indices. When the pool already contains duplicates, the first
    /// occurrence is the one future lookups return.
    pub fn from_constants(constants: OffsetVec<Constant>) -> ConstantsPool {
        let mut interned = HashMap::new();
        for (Offset(offset), constant) in &constants {
            interned
                .entry(constant.clone())
                .or_insert(ConstantIndex(offset as u16));
        }
        ConstantsPool {
            constants,
            interned,
        }
    }

    /// Number of slots used, including the reserved slot 0
    pub fn len(&self) -> usize {
        self.constants.offset_len().0
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Constants interned so far, in pool order
    pub fn constants(&self) -> &OffsetVec<Constant> {
        &self.constants
    }

    /// Consume the pool and return the final vector of constants
    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Get a constant from the pool
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.0 as usize))
    }

    /// Look up a UTF-8 constant
    pub fn lookup_utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Get or insert a constant
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    pub fn intern(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        if let Some(index) = self.interned.get(&constant) {
            return Ok(*index);
        }

        let Offset(offset) = self.constants.offset_len();
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }
        let index = ConstantIndex(offset as u16);
        self.constants.push(constant.clone());
        self.interned.insert(constant, index);
        Ok(index)
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<S: AsRef<str>>(&mut self, utf8: S) -> Result<Utf8ConstantIndex, Error> {
        self.intern(Constant::Utf8(utf8.as_ref().to_owned()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a string constant given as UTF-16 code units, which may contain unpaired
    /// surrogates
    pub fn get_utf16(&mut self, units: &[u16]) -> Result<Utf8ConstantIndex, Error> {
        self.intern(Constant::from_utf16(units.to_vec()))
            .map(Utf8ConstantIndex)
    }

    /// Get or insert a class constant from the constant pool
    pub fn get_class(&mut self, name: Utf8ConstantIndex) -> Result<ClassConstantIndex, Error> {
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    /// Get or insert a class constant by its binary name (eg. `java/lang/Object`)
    pub fn get_class_named<S: AsRef<str>>(
        &mut self,
        name: S,
    ) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        self.get_class(name)
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, utf8: Utf8ConstantIndex) -> Result<StringConstantIndex, Error> {
        self.intern(Constant::String(utf8)).map(StringConstantIndex)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Integer(integer))
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Float(float))
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Long(long))
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        self.intern(Constant::Double(double))
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    /// Get or insert a field reference constant from the constant pool
    pub fn get_field_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<FieldRefConstantIndex, Error> {
        self.intern(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    /// Get or insert a method reference constant from the constant pool
    pub fn get_method_ref(
        &mut self,
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        self.intern(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
        .map(MethodRefConstantIndex)
    }

    /// Get or insert a method handle constant from the constant pool
    pub fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        self.intern(Constant::MethodHandle {
            handle_kind,
            member,
        })
    }

    /// Get or insert a method type constant from the constant pool
    pub fn get_method_type(
        &mut self,
        descriptor: Utf8ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        self.intern(Constant::MethodType { descriptor })
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    ) -> Result<InvokeDynamicConstantIndex, Error> {
        self.intern(Constant::InvokeDynamic {
            bootstrap_method,
            method_descriptor,
        })
        .map(InvokeDynamicConstantIndex)
    }

    /// Intern everything needed to refer to a field: class, name, descriptor
    pub fn get_field_ref_for(&mut self, field: &FieldRef) -> Result<FieldRefConstantIndex, Error> {
        let class = self.get_class_named(&field.class)?;
        let name = self.get_utf8(&field.name)?;
        let descriptor = self.get_utf8(field.field_type.render())?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_field_ref(class, name_and_type)
    }

    /// Intern everything needed to refer to a method: class, name, descriptor
    pub fn get_method_ref_for(
        &mut self,
        method: &MethodRef,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.get_class_named(&method.class)?;
        let name = self.get_utf8(&method.name)?;
        let descriptor = self.get_utf8(method.descriptor.render())?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_method_ref(class, name_and_type, method.is_interface)
    }

    /// Serialize a structured attribute body and intern its name
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> ConstantsPool {
        ConstantsPool::new()
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.constants.serialize(writer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BaseType, FieldType, MethodDescriptor};

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstantsPool::new();
        let object1 = pool.get_class_named("java/lang/Object").unwrap();
        let string = pool.get_class_named("java/lang/String").unwrap();
        let object2 = pool.get_class_named("java/lang/Object").unwrap();
        assert_eq!(object1, object2);
        assert_ne!(object1, string);

        // utf8, class, utf8, class
        assert_eq!(pool.len(), 5);
        assert_eq!(object1.0, ConstantIndex(2));
        assert_eq!(pool.get(ConstantIndex(1)), Some(&Constant::Utf8("java/lang/Object".into())));
    }

    #[test]
    fn indices_start_at_one_and_skip_after_wide_entries() {
        let mut pool = ConstantsPool::new();
        assert_eq!(pool.get_long(1).unwrap(), ConstantIndex(1));
        assert_eq!(pool.get_integer(1).unwrap(), ConstantIndex(3));
        assert_eq!(pool.get_double(1.0).unwrap(), ConstantIndex(4));
        assert_eq!(pool.get_float(1.0).unwrap(), ConstantIndex(6));
        assert_eq!(pool.get(ConstantIndex(2)), None);
        assert_eq!(pool.get(ConstantIndex(0)), None);
    }

    #[test]
    fn same_payload_different_tag_are_distinct() {
        let mut pool = ConstantsPool::new();
        let utf8 = pool.get_utf8("x").unwrap();
        let class = pool.get_class(utf8).unwrap();
        let string = pool.get_string(utf8).unwrap();
        assert_ne!(class.0, string.0);

        let int = pool.get_integer(0).unwrap();
        let float = pool.get_float(0.0).unwrap();
        let negative_zero = pool.get_float(-0.0).unwrap();
        assert_ne!(int, float);
        assert_ne!(float, negative_zero);
    }

    #[test]
    fn utf16_text_shares_entries_with_utf8() {
        let mut pool = ConstantsPool::new();
        let hi = pool.get_utf8("Hi").unwrap();
        assert_eq!(pool.get_utf16(&[0x48, 0x69]).unwrap(), hi);

        let lone = pool.get_utf16(&[0xD800]).unwrap();
        assert_ne!(lone, hi);
        assert_eq!(pool.get_utf16(&[0xD800]).unwrap(), lone);
        assert_eq!(pool.get(lone.0), Some(&Constant::Utf16(vec![0xD800])));
        assert_eq!(pool.lookup_utf8(lone), None);
    }

    #[test]
    fn member_refs_share_their_parts() {
        let mut pool = ConstantsPool::new();
        let field = FieldRef {
            class: "Counter".into(),
            name: "count".into(),
            field_type: FieldType::Base(BaseType::Int),
        };
        let method = MethodRef {
            class: "Counter".into(),
            name: "count".into(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::Base(BaseType::Int)),
            },
            is_interface: false,
        };
        let field_index = pool.get_field_ref_for(&field).unwrap();
        let before = pool.len();
        let method_index = pool.get_method_ref_for(&method).unwrap();

        // only `()I`, its name and type, and the method ref are new
        assert_eq!(pool.len(), before + 3);
        assert_ne!(field_index.0, method_index.0);
        assert_eq!(pool.get_field_ref_for(&field).unwrap(), field_index);
    }

    #[test]
    fn reopened_pool_keeps_indices() {
        let mut pool = ConstantsPool::new();
        let hello = pool.get_utf8("hello").unwrap();
        let seven = pool.get_long(7).unwrap();
        let constants = pool.into_offset_vec();

        let mut reopened = ConstantsPool::from_constants(constants);
        assert_eq!(reopened.get_utf8("hello").unwrap(), hello);
        assert_eq!(reopened.get_long(7).unwrap(), seven);
        assert_eq!(reopened.get_utf8("world").unwrap(), Utf8ConstantIndex(ConstantIndex(4)));
        assert_eq!(reopened.lookup_utf8(hello), Some("hello"));
        assert_eq!(reopened.lookup_utf8(Utf8ConstantIndex(seven)), None);
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantsPool::new();
        for i in 0..(u16::MAX as i32 - 1) {
            pool.get_integer(i).unwrap();
        }
        assert_eq!(pool.len(), u16::MAX as usize);
        assert!(matches!(
            pool.get_integer(-1),
            Err(Error::ConstantPoolOverflow { offset: 65535, .. })
        ));
        // already present constants can still be looked up
        assert_eq!(pool.get_integer(0).unwrap(), ConstantIndex(1));
    }
}
