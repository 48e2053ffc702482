//! JVM class files: the data model, a byte-exact reader and writer, and builders for assembling
//! new classes
//!
//! The usual flow for generating a class is:
//!
//!   1. create a [`ClassBuilder`] (which owns the constant pool for the class)
//!   2. for each method, get a [`code::MethodBuilder`], fill in its blocks, and `finish` it into a
//!      `Code` attribute
//!   3. add the methods and fields to the class builder, then take the [`class_file::ClassFile`]
//!      out and serialize it

mod access_flags;
mod class_builder;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod members;
pub mod verifier;

pub use access_flags::*;
pub use class_builder::*;
pub use descriptors::*;
pub use errors::*;
pub use members::*;
