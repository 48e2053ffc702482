use crate::jvm::{FieldType, MethodDescriptor};

/// Symbolic reference to a field, resolved to a `CONSTANT_Fieldref` when used
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    /// Binary name of the class declaring the field
    pub class: String,
    pub name: String,
    pub field_type: FieldType,
}

/// Symbolic reference to a method, resolved to a `CONSTANT_Methodref` (or
/// `CONSTANT_InterfaceMethodref`) when used
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    /// Binary name of the class declaring the method
    pub class: String,
    pub name: String,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}
