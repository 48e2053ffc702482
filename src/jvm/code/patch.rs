use crate::jvm::code::BlockId;
use crate::jvm::Error;

/// Placeholder 2-byte operand in the linearized code, waiting to be filled in
///
/// Block offsets depend on the order in which the graph gets walked, so jumps to blocks that have
/// not been placed yet cannot be computed inline. Instead, the operand is zeroed out and a patch
/// is recorded. Once every block has an offset, all patches are applied in one go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Offset of the first of the two bytes to overwrite
    pub location: usize,
    pub kind: PatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchKind {
    /// Value was already known when the placeholder was emitted
    Short(i16),

    /// Signed distance from `origin` (the offset of the jump instruction itself) to wherever
    /// `target` ends up
    Jump { target: BlockId, origin: usize },
}

/// Signed 16-bit distance between two code offsets
pub fn jump_offset(origin: usize, target: usize) -> Result<i16, Error> {
    let delta = target as isize - origin as isize;
    i16::try_from(delta).map_err(|_| Error::JumpOffsetOverflow { origin, target })
}

impl Patch {
    /// Compute the final value, given the offsets of placed blocks
    pub fn resolve(&self, block_offsets: &[Option<usize>]) -> Result<i16, Error> {
        match self.kind {
            PatchKind::Short(value) => Ok(value),
            PatchKind::Jump { target, origin } => {
                let target_offset = block_offsets
                    .get(target.index())
                    .copied()
                    .flatten()
                    .ok_or(Error::UnresolvedPatch(target))?;
                jump_offset(origin, target_offset)
            }
        }
    }

    /// Overwrite the placeholder with the final big-endian value
    pub fn apply(&self, code: &mut [u8], block_offsets: &[Option<usize>]) -> Result<(), Error> {
        let value = self.resolve(block_offsets)?;
        log::trace!("patching {:?} at {} with {}", self.kind, self.location, value);
        code[self.location..self.location + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn forward_and_backward_jumps() {
        let offsets = vec![Some(0), Some(10), None];
        let mut code = vec![0u8; 12];

        let forward = Patch {
            location: 3,
            kind: PatchKind::Jump {
                target: BlockId::from_index(1),
                origin: 2,
            },
        };
        let backward = Patch {
            location: 8,
            kind: PatchKind::Jump {
                target: BlockId::from_index(0),
                origin: 7,
            },
        };
        forward.apply(&mut code, &offsets).unwrap();
        backward.apply(&mut code, &offsets).unwrap();
        assert_eq!(&code[3..5], &8i16.to_be_bytes());
        assert_eq!(&code[8..10], &(-7i16).to_be_bytes());
    }

    #[test]
    fn unplaced_target() {
        let patch = Patch {
            location: 0,
            kind: PatchKind::Jump {
                target: BlockId::from_index(2),
                origin: 0,
            },
        };
        assert!(matches!(
            patch.resolve(&[Some(0), Some(1), None]),
            Err(Error::UnresolvedPatch(block)) if block == BlockId::from_index(2)
        ));
    }

    #[test]
    fn offsets_must_fit_in_16_bits() {
        assert_eq!(jump_offset(40000, 100).ok(), None);
        assert_eq!(jump_offset(0, 32767).ok(), Some(32767));
        assert_eq!(jump_offset(32768, 0).ok(), Some(-32768));
    }
}
