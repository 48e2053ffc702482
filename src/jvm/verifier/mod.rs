//! Verification types and frames
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! Knowing the frame at a point in the code makes it possible to check that the next instruction
//! makes sense (eg. `iadd` only makes sense if the top two elements on the stack are of type
//! `int`). The "types" used (represented using [`VerificationType`]) are slightly augmented to
//! take into account initialization and null.
//!
//! Since inferring the stack map table of a method is potentially quite expensive, method code
//! must be annotated with a [`crate::jvm::class_file::StackMapTable`] attribute which stores the
//! frame for every offset that is the target of a jump. The method builder produces this from the
//! entry frames of the blocks that get jumped to.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod types;

pub use frame::*;
pub use types::*;
