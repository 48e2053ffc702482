//! Data model of the class file format, along with its binary reader and writer
//!
//! Writing is done through [`Serialize`] and reading through [`Deserialize`] (driven by a
//! [`ClassReader`]). The two are exact inverses: for anything the reader accepts, serializing
//! the result produces the original bytes.

mod attribute;
mod class;
mod constants;
mod constants_pool;
mod field;
mod method;
mod reader;
mod serialize;
mod version;

pub use attribute::*;
pub use class::*;
pub use constants::*;
pub use constants_pool::*;
pub use field::*;
pub use method::*;
pub use reader::*;
pub use serialize::*;
pub use version::*;
