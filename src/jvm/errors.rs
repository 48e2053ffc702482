use crate::jvm::class_file::{Constant, ParseError};
use crate::jvm::code::{BlockId, BranchCondition, NumericKind};
use crate::jvm::verifier::{Frame, VerificationType};
use std::fmt;

/// Everything that can go wrong while reading, building, or writing a class
///
/// Apart from `IoError` and `Parse`, these all indicate that the code driving the builders is
/// broken (eg. it popped a type that was not on the stack). None of them are recoverable: the
/// class or method being built should be abandoned.
#[derive(Debug)]
pub enum Error {
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },
    IoError(std::io::Error),
    Parse(ParseError),

    /// Method body exceeds the 65535 byte limit
    MethodCodeOverflow {
        block: BlockId,
        offset: usize,
    },
    MethodCodeMaxStackOverflow(usize),
    MethodCodeMaxLocalsOverflow(usize),

    /// A resolved jump does not fit in a signed 16-bit offset
    JumpOffsetOverflow {
        origin: usize,
        target: usize,
    },

    /// Error trying to verify
    VerifierError {
        instruction: String,
        kind: VerifierErrorKind,
    },

    /// Block already has an outgoing edge
    BlockAlreadySealed(BlockId),

    /// Block is reachable but never got an outgoing edge
    BlockNotSealed(BlockId),

    /// Handle does not belong to this method builder
    UnknownBlock(BlockId),

    /// A patch targets a block which never got placed
    UnresolvedPatch(BlockId),

    /// A jump leaves the stack or locals in a state its target does not accept
    IncompatibleFrames {
        from: BlockId,
        to: BlockId,
        found: Frame,
        expected: Frame,
    },

    /// Two different frames are required at the same bytecode offset
    ConflictingFrames {
        offset: u16,
        first: Frame,
        second: Frame,
    },

    UnsupportedBranchCondition(BranchCondition),

    /// Descriptor string does not follow the descriptor grammar
    BadDescriptor(String),

    /// Returned value does not match the declared result type
    ReturnTypeMismatch {
        expected: Option<VerificationType>,
        found: Option<VerificationType>,
    },

    /// Method builder has already produced its `Code`
    AlreadyFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidType {
        expected: VerificationType,
        found: VerificationType,
    },
    InvalidIndex(u16),
    UnreservedLocal(u16),
    NotLoadable,

    /// Bitwise and shift operations only exist for `int` and `long`
    NotIntegral(NumericKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool is full (next offset {}), cannot add {:?}",
                offset, constant
            ),
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Parse(err) => write!(f, "malformed class file {}", err),
            Error::MethodCodeOverflow { block, offset } => write!(
                f,
                "method body is too large ({} bytes reached while placing {:?})",
                offset, block
            ),
            Error::MethodCodeMaxStackOverflow(max) => {
                write!(f, "max stack {} does not fit in 16 bits", max)
            }
            Error::MethodCodeMaxLocalsOverflow(max) => {
                write!(f, "max locals {} does not fit in 16 bits", max)
            }
            Error::JumpOffsetOverflow { origin, target } => write!(
                f,
                "jump from {} to {} does not fit in a 16-bit offset",
                origin, target
            ),
            Error::VerifierError { instruction, kind } => {
                write!(f, "`{}` does not verify: {}", instruction, kind)
            }
            Error::BlockAlreadySealed(block) => {
                write!(f, "{:?} already has an outgoing edge", block)
            }
            Error::BlockNotSealed(block) => write!(f, "{:?} was never sealed", block),
            Error::UnknownBlock(block) => write!(f, "{:?} is not part of this method", block),
            Error::UnresolvedPatch(block) => {
                write!(f, "jump to {:?} which was never placed", block)
            }
            Error::IncompatibleFrames {
                from,
                to,
                found,
                expected,
            } => write!(
                f,
                "{:?} jumps to {:?} with frame {:?} but {:?} is expected",
                from, to, found, expected
            ),
            Error::ConflictingFrames {
                offset,
                first,
                second,
            } => write!(
                f,
                "conflicting frames at offset {}: {:?} vs. {:?}",
                offset, first, second
            ),
            Error::UnsupportedBranchCondition(condition) => {
                write!(f, "branch condition {:?} is not supported", condition)
            }
            Error::BadDescriptor(desc) => write!(f, "bad descriptor {:?}", desc),
            Error::ReturnTypeMismatch { expected, found } => write!(
                f,
                "method returns {:?} but block returns {:?}",
                expected, found
            ),
            Error::AlreadyFinished => write!(f, "method builder was already finished"),
        }
    }
}

impl fmt::Display for VerifierErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierErrorKind::EmptyStack => write!(f, "operand stack is empty"),
            VerifierErrorKind::InvalidType { expected, found } => {
                write!(f, "expected {:?} but found {:?}", expected, found)
            }
            VerifierErrorKind::InvalidIndex(index) => {
                write!(f, "index {} does not fit the instruction", index)
            }
            VerifierErrorKind::UnreservedLocal(slot) => {
                write!(f, "local {} was never reserved", slot)
            }
            VerifierErrorKind::NotLoadable => write!(f, "local cannot be loaded"),
            VerifierErrorKind::NotIntegral(kind) => {
                write!(f, "operation is not defined on {:?}", kind)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}
