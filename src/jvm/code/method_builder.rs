use crate::jvm::class_file::{
    Attribute, BytecodeArray, ClassConstantIndex, Code, ConstantsPool, StackMapFrame,
    StackMapTable,
};
use crate::jvm::code::instructions::opcode;
use crate::jvm::code::{jump_offset, BasicBlock, BlockEnd, BlockId, Patch, PatchKind};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::{Error, MethodDescriptor};
use crate::util::{Offset, OffsetVec};

/// Builds the body of one method out of a graph of basic blocks
///
/// Blocks are created up front (or as they are needed) and filled in any order: jumps refer to
/// blocks by [`BlockId`], not by offset. Nothing is laid out until [`MethodBuilder::finish`], which
/// walks the graph depth-first from the entry block and places every reachable block exactly once.
///
/// ### Frames
///
/// Each block declares the frame it expects on entry when it is created. There is no merging of
/// frames: an edge is accepted only if the frame at the end of the source block is assignable to
/// the target's entry frame. This means entry frames can go straight into the `StackMapTable`
/// without any fixpoint iteration.
#[derive(Debug)]
pub struct MethodBuilder {
    /// Blocks, indexed by [`BlockId`]
    blocks: Vec<BasicBlock>,

    /// Declared result type (`None` for `void`)
    return_type: Option<VerificationType>,

    finished: bool,
}

/// Pending work during linearization
#[derive(Debug, Copy, Clone)]
enum Task {
    /// Lay out the block here, or jump to it if it has already been laid out
    Place(BlockId),

    /// Lay out the block here, unless it has already been laid out (then there is nothing to do,
    /// since a comparison already jumps to it)
    PlaceIfUnvisited(BlockId),
}

impl MethodBuilder {
    pub fn new(
        initial_locals: Vec<VerificationType>,
        return_type: Option<VerificationType>,
    ) -> MethodBuilder {
        let entry_frame = Frame::new(initial_locals.into_iter().collect(), OffsetVec::new());
        MethodBuilder {
            blocks: vec![BasicBlock::new(BlockId::ENTRY, entry_frame, return_type)],
            return_type,
            finished: false,
        }
    }

    /// Start a method with the given signature
    ///
    /// For instance methods, `this_class` is the type of the implicit receiver in local 0.
    pub fn from_descriptor(
        pool: &mut ConstantsPool,
        descriptor: &MethodDescriptor,
        this_class: Option<ClassConstantIndex>,
    ) -> Result<MethodBuilder, Error> {
        let mut locals = vec![];
        if let Some(this_class) = this_class {
            locals.push(VerificationType::Object(this_class));
        }
        for parameter in &descriptor.parameters {
            locals.push(parameter.verification_type(pool)?);
        }
        let return_type = match &descriptor.return_type {
            Some(return_type) => Some(return_type.verification_type(pool)?),
            None => None,
        };
        Ok(MethodBuilder::new(locals, return_type))
    }

    /// Block where execution starts
    pub fn entry(&self) -> BlockId {
        BlockId::ENTRY
    }

    /// Create an empty block expecting the given locals and stack on entry
    pub fn new_block(
        &mut self,
        pre_locals: Vec<VerificationType>,
        pre_stack: Vec<VerificationType>,
    ) -> BlockId {
        let frame = Frame::new(
            pre_locals.into_iter().collect(),
            pre_stack.into_iter().collect(),
        );
        let id = BlockId::from_index(self.blocks.len());
        self.blocks
            .push(BasicBlock::new(id, frame, self.return_type));
        id
    }

    /// Create a block which starts with the locals `from` currently has
    pub fn continue_block(
        &mut self,
        from: BlockId,
        extra_stack: Vec<VerificationType>,
    ) -> Result<BlockId, Error> {
        let locals = self.block_ref(from)?.frame().locals.clone();
        let frame = Frame::new(locals, extra_stack.into_iter().collect());
        let id = BlockId::from_index(self.blocks.len());
        self.blocks
            .push(BasicBlock::new(id, frame, self.return_type));
        Ok(id)
    }

    pub fn block(&mut self, id: BlockId) -> Result<&mut BasicBlock, Error> {
        self.blocks
            .get_mut(id.index())
            .ok_or(Error::UnknownBlock(id))
    }

    pub fn block_ref(&self, id: BlockId) -> Result<&BasicBlock, Error> {
        self.blocks.get(id.index()).ok_or(Error::UnknownBlock(id))
    }

    /// Number of blocks created so far (reachable or not), never zero since the entry block always
    /// exists
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check that control can flow from the end of `from` into `to`
    fn check_edge(&self, from: &BasicBlock, to: BlockId) -> Result<(), Error> {
        let target = self.block_ref(to)?;
        if from.frame().is_assignable_to(target.entry_frame()) {
            Ok(())
        } else {
            Err(Error::IncompatibleFrames {
                from: from.id(),
                to,
                found: from.frame().clone(),
                expected: target.entry_frame().clone(),
            })
        }
    }

    /// Lay out the block graph and produce the method's `Code` attribute
    ///
    /// The walk is depth-first from the entry block. Unconditional jumps to blocks that have not
    /// been placed yet become fallthroughs. Branches emit the negated comparison towards the
    /// "false" block, then lay out the "true" block as the fallthrough. Whenever the walk reaches
    /// a block that is already placed, a `goto` to it is emitted instead. Unreachable blocks are
    /// ignored.
    pub fn finish(&mut self, pool: &mut ConstantsPool) -> Result<Vec<Attribute>, Error> {
        if self.finished {
            return Err(Error::AlreadyFinished);
        }

        let mut code: Vec<u8> = vec![];
        let mut patches: Vec<Patch> = vec![];
        let mut block_offsets: Vec<Option<usize>> = vec![None; self.blocks.len()];
        let mut jump_targets: Vec<bool> = vec![false; self.blocks.len()];
        let mut max_stack = Offset(0);
        let mut max_locals = Offset(0);
        let mut synthetic_jumps = 0;

        let mut tasks = vec![Task::Place(BlockId::ENTRY)];
        while let Some(task) = tasks.pop() {
            let id = match task {
                Task::PlaceIfUnvisited(id) if block_offsets[id.index()].is_some() => continue,
                Task::Place(id) | Task::PlaceIfUnvisited(id) => id,
            };
            let block = self.block_ref(id)?;

            // Already placed, so jump back to it
            if let Some(target) = block_offsets[id.index()] {
                let origin = code.len();
                code.extend_from_slice(&[opcode::GOTO, 0, 0]);
                patches.push(Patch {
                    location: origin + 1,
                    kind: PatchKind::Short(jump_offset(origin, target)?),
                });
                jump_targets[id.index()] = true;
                synthetic_jumps += 1;
                check_code_length(&code, id)?;
                continue;
            }

            let end = block.end().ok_or(Error::BlockNotSealed(id))?;
            block_offsets[id.index()] = Some(code.len());
            code.extend_from_slice(block.code());
            max_stack.0 = max_stack.0.max(block.max_stack().0);
            max_locals.0 = max_locals.0.max(block.max_locals().0);

            match end {
                BlockEnd::Return { opcode } => code.push(opcode),
                BlockEnd::Jump(target) => {
                    self.check_edge(block, target)?;
                    tasks.push(Task::Place(target));
                }
                BlockEnd::Branch {
                    condition,
                    if_true,
                    if_false,
                } => {
                    self.check_edge(block, if_true)?;
                    self.check_edge(block, if_false)?;
                    let compare = condition
                        .negated_compare_opcode()
                        .ok_or(Error::UnsupportedBranchCondition(condition))?;
                    let origin = code.len();
                    code.extend_from_slice(&[compare, 0, 0]);
                    patches.push(Patch {
                        location: origin + 1,
                        kind: PatchKind::Jump {
                            target: if_false,
                            origin,
                        },
                    });
                    jump_targets[if_false.index()] = true;

                    // Stack order: `if_true` gets placed first, right after the comparison
                    tasks.push(Task::PlaceIfUnvisited(if_false));
                    tasks.push(Task::Place(if_true));
                }
            }

            check_code_length(&code, id)?;
        }

        for patch in &patches {
            patch.apply(&mut code, &block_offsets)?;
        }

        let frames = self.stack_map_frames(&block_offsets, &jump_targets)?;
        for (index, offset) in block_offsets.iter().enumerate() {
            if offset.is_none() {
                log::debug!("{:?} is unreachable and was not emitted", BlockId::from_index(index));
            }
        }
        log::debug!(
            "laid out {} of {} blocks in {} bytes ({} patches, {} synthetic jumps, {} frames)",
            block_offsets.iter().filter(|offset| offset.is_some()).count(),
            self.blocks.len(),
            code.len(),
            patches.len(),
            synthetic_jumps,
            frames.len()
        );

        let mut attributes = vec![];
        if !frames.is_empty() {
            attributes.push(pool.get_attribute(StackMapTable(frames))?);
        }
        let code = Code {
            max_stack: u16::try_from(max_stack.0)
                .map_err(|_| Error::MethodCodeMaxStackOverflow(max_stack.0))?,
            max_locals: u16::try_from(max_locals.0)
                .map_err(|_| Error::MethodCodeMaxLocalsOverflow(max_locals.0))?,
            code_array: BytecodeArray(code),
            exception_table: vec![],
            attributes,
        };
        let code = pool.get_attribute(code)?;
        self.finished = true;
        Ok(vec![code])
    }

    /// Full frames for every placed jump target, in offset order
    fn stack_map_frames(
        &self,
        block_offsets: &[Option<usize>],
        jump_targets: &[bool],
    ) -> Result<Vec<StackMapFrame>, Error> {
        let mut targets: Vec<(u16, &Frame)> = vec![];
        for (block, offset) in self.blocks.iter().zip(block_offsets) {
            match offset {
                Some(offset) if jump_targets[block.id().index()] => {
                    // Placed code is never longer than `u16::MAX`
                    let offset = u16::try_from(*offset).map_err(|_| Error::MethodCodeOverflow {
                        block: block.id(),
                        offset: *offset,
                    })?;
                    targets.push((offset, block.entry_frame()));
                }
                _ => (),
            }
        }
        targets.sort_by_key(|(offset, _)| *offset);

        let mut frames = vec![];
        let mut previous: Option<(u16, &Frame)> = None;
        for (offset, frame) in targets {
            let offset_delta = match previous {
                None => offset,
                Some((previous_offset, previous_frame)) if previous_offset == offset => {
                    if previous_frame != frame {
                        return Err(Error::ConflictingFrames {
                            offset,
                            first: previous_frame.clone(),
                            second: frame.clone(),
                        });
                    }
                    continue;
                }
                Some((previous_offset, _)) => offset - previous_offset - 1,
            };
            frames.push(frame.full_stack_map_frame(offset_delta));
            previous = Some((offset, frame));
        }
        Ok(frames)
    }
}

/// Code arrays are limited to `u16::MAX` bytes so that every offset fits in a `u16`
fn check_code_length(code: &[u8], block: BlockId) -> Result<(), Error> {
    if code.len() > u16::MAX as usize {
        Err(Error::MethodCodeOverflow {
            block,
            offset: code.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{ArithmeticOp, BranchCondition, NumericKind};

    fn parse_code(pool: &ConstantsPool, attributes: &[Attribute]) -> Code {
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].name(pool.constants()), Some("Code"));
        attributes[0].parse::<Code>().unwrap()
    }

    #[test]
    fn unsealed_blocks_are_rejected() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        assert_eq!(method.len(), 1);
        assert!(matches!(
            method.finish(&mut pool),
            Err(Error::BlockNotSealed(BlockId::ENTRY))
        ));
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        let entry = method.entry();
        method.block(entry).unwrap().jump(BlockId::from_index(7)).unwrap();
        assert!(matches!(
            method.finish(&mut pool),
            Err(Error::UnknownBlock(block)) if block.index() == 7
        ));
        assert!(matches!(
            method.block(BlockId::from_index(7)),
            Err(Error::UnknownBlock(_))
        ));
    }

    #[test]
    fn fallthrough_jumps_are_free() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![VerificationType::Integer], None);
        let next = method.continue_block(method.entry(), vec![]).unwrap();
        let entry = method.entry();
        method.block(entry).unwrap().jump(next).unwrap();
        method.block(next).unwrap().return_void().unwrap();

        let attributes = method.finish(&mut pool).unwrap();
        let code = parse_code(&pool, &attributes);
        assert_eq!(code.code_array.0, vec![0xb1]);
        assert_eq!(code.max_locals, 1);
        assert!(code.attributes.is_empty());
    }

    #[test]
    fn jump_frames_must_match() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        let target = method.new_block(vec![], vec![VerificationType::Long]);
        let entry = method.entry();
        method.block(entry).unwrap().push_int(&mut pool, 1).unwrap();
        method.block(entry).unwrap().jump(target).unwrap();
        method.block(target).unwrap().pop().unwrap();
        method.block(target).unwrap().return_void().unwrap();
        assert!(matches!(
            method.finish(&mut pool),
            Err(Error::IncompatibleFrames { to, .. }) if to == target
        ));
    }

    #[test]
    fn second_finish_fails() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        let entry = method.entry();
        method.block(entry).unwrap().return_void().unwrap();
        method.finish(&mut pool).unwrap();
        assert!(matches!(
            method.finish(&mut pool),
            Err(Error::AlreadyFinished)
        ));
    }

    #[test]
    fn loop_back_to_the_entry_block() {
        // while (true) { x = x + 1 }, with a single block jumping to itself
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![VerificationType::Integer], None);
        let entry = method.entry();
        let body = method.continue_block(entry, vec![]).unwrap();
        method.block(entry).unwrap().jump(body).unwrap();
        {
            let body_block = method.block(body).unwrap();
            body_block.load_local(0).unwrap();
            body_block.push_int(&mut pool, 1).unwrap();
            body_block
                .arithmetic(ArithmeticOp::Add, NumericKind::Int)
                .unwrap();
            body_block.store_local(0).unwrap();
            body_block.jump(body).unwrap();
        }

        let attributes = method.finish(&mut pool).unwrap();
        let code = parse_code(&pool, &attributes);
        // iload_0 iconst_1 iadd istore_0 goto -4
        assert_eq!(code.code_array.0, vec![0x1a, 0x04, 0x60, 0x3b, 0xa7, 0xff, 0xfc]);
        assert_eq!(code.max_stack, 2);
        let table = code.attributes[0].parse::<StackMapTable>().unwrap();
        assert_eq!(
            table.0,
            vec![StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![VerificationType::Integer],
                stack: vec![],
            }]
        );
    }

    #[test]
    fn unsupported_conditions_fail_at_the_source() {
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        let done = method.new_block(vec![], vec![]);
        let entry = method.entry();
        let block = method.block(entry).unwrap();
        block.push_int(&mut pool, 0).unwrap();
        block.push_int(&mut pool, 0).unwrap();
        assert!(matches!(
            block.branch(BranchCondition::Gt, done, done),
            Err(Error::UnsupportedBranchCondition(BranchCondition::Gt))
        ));
    }

    #[test]
    fn trailing_goto_cannot_overflow_the_code_array() {
        // 65532 bytes of `iconst_0 pop`, then a 2-byte tail looping on itself: the tail fits, but
        // the `goto` back to it does not
        let mut pool = ConstantsPool::new();
        let mut method = MethodBuilder::new(vec![], None);
        let entry = method.entry();
        let tail = method.new_block(vec![], vec![]);
        let block = method.block(entry).unwrap();
        for _ in 0..32766 {
            block.push_int(&mut pool, 0).unwrap();
            block.pop().unwrap();
        }
        block.jump(tail).unwrap();
        let block = method.block(tail).unwrap();
        block.push_int(&mut pool, 0).unwrap();
        block.pop().unwrap();
        block.jump(tail).unwrap();

        assert!(matches!(
            method.finish(&mut pool),
            Err(Error::MethodCodeOverflow { block, offset: 65537 }) if block == tail
        ));
    }
}
