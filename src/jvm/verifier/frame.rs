use super::VerificationType;
use crate::jvm::class_file::StackMapFrame;
use crate::jvm::VerifierErrorKind;
use crate::util::{Offset, OffsetVec};

/// A frame represents the state of the stack and local variables at any location in the bytecode
///
/// In order to load bytecode into the JVM, the JVM requires that methods be annotated with
/// `StackMapTable` attributes to describe the state of the frame at offsets that can be jumped to.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame {
    /// Local variables in the frame
    pub locals: OffsetVec<VerificationType>,

    /// Stack in the frame
    pub stack: OffsetVec<VerificationType>,
}

impl Frame {
    pub fn new(locals: OffsetVec<VerificationType>, stack: OffsetVec<VerificationType>) -> Frame {
        Frame { locals, stack }
    }

    /// Push a type on top of the stack
    pub fn push(&mut self, vtype: VerificationType) {
        self.stack.push(vtype);
    }

    /// Pop whatever is on top of the stack
    pub fn pop(&mut self) -> Result<VerificationType, VerifierErrorKind> {
        self.stack
            .pop()
            .map(|(_, vtype)| vtype)
            .ok_or(VerifierErrorKind::EmptyStack)
    }

    /// Pop the top of the stack, checking it is assignable to `expected`
    ///
    /// The stack is left untouched if the check fails.
    pub fn pop_expecting(&mut self, expected: VerificationType) -> Result<(), VerifierErrorKind> {
        let found = *self.stack.last().ok_or(VerifierErrorKind::EmptyStack)?;
        if VerificationType::is_assignable(&found, &expected) {
            self.stack.pop();
            Ok(())
        } else {
            Err(VerifierErrorKind::InvalidType { expected, found })
        }
    }

    /// Type of the local variable starting at `slot`
    pub fn local(&self, slot: u16) -> Result<VerificationType, VerifierErrorKind> {
        self.locals
            .get_offset(Offset(slot as usize))
            .copied()
            .ok_or(VerifierErrorKind::UnreservedLocal(slot))
    }

    /// Add a local variable after all of the existing ones, returning its slot
    pub fn reserve_local(&mut self, vtype: VerificationType) -> Result<u16, VerifierErrorKind> {
        let Offset(slot) = self.locals.offset_len();
        let slot = u16::try_from(slot).map_err(|_| VerifierErrorKind::InvalidIndex(u16::MAX))?;
        self.locals.push(vtype);
        Ok(slot)
    }

    /// Update the maximum locals and stack
    pub fn update_maximums(&self, max_locals: &mut Offset, max_stack: &mut Offset) {
        max_locals.0 = max_locals.0.max(self.locals.offset_len().0);
        max_stack.0 = max_stack.0.max(self.stack.offset_len().0);
    }

    /// Can control flow from a point with this frame into a point expecting `target`?
    ///
    /// Stacks must line up entry by entry. The target's locals must be a prefix of ours (extra
    /// trailing locals are simply dropped) with each one assignable.
    pub fn is_assignable_to(&self, target: &Frame) -> bool {
        if self.stack.len() != target.stack.len() {
            return false;
        }
        let stack_ok = self
            .stack
            .iter()
            .zip(target.stack.iter())
            .all(|((_, found), (_, expected))| VerificationType::is_assignable(found, expected));
        stack_ok
            && target.locals.iter().all(|(offset, expected)| {
                match self.locals.get_offset(offset) {
                    Some(found) => VerificationType::is_assignable(found, expected),
                    None => *expected == VerificationType::Top,
                }
            })
    }

    /// Compute a full stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            locals: self.locals.iter().map(|(_, t)| *t).collect(),
            stack: self.stack.iter().map(|(_, t)| *t).collect(),
        }
    }
}
