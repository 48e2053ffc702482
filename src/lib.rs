//! Assembler for JVM class files
//!
//! See [`jvm`] for the class file model and builders.

pub mod jvm;
pub mod util;
