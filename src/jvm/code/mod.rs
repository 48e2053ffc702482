//! Building method bodies
//!
//! Code is assembled as a graph of [`BasicBlock`]s owned by a [`MethodBuilder`]. Every instruction
//! is type-checked against an abstract [`crate::jvm::verifier::Frame`] as it is added, so by the
//! time the graph is laid out the only thing left to do is pick an order, resolve jump offsets and
//! write the `StackMapTable`.

mod basic_block;
mod instructions;
mod method_builder;
mod patch;

pub use basic_block::*;
pub use instructions::{
    negate_mnemonic, negate_opcode, opcode, return_opcode, ArithmeticOp, BranchCondition,
    NumericKind,
};
pub use method_builder::*;
pub use patch::*;
