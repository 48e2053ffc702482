use crate::jvm::class_file::ConstantsPool;
use crate::jvm::code::instructions::{negate_mnemonic, negate_opcode, opcode, LocalAccess};
use crate::jvm::code::{return_opcode, ArithmeticOp, BranchCondition, NumericKind};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::jvm::{Error, FieldRef, MethodRef, VerifierErrorKind};
use crate::util::{Offset, Width};
use std::fmt;

/// Handle to a block inside a [`super::MethodBuilder`]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockId(usize);

impl BlockId {
    /// Block at which the method starts
    pub const ENTRY: BlockId = BlockId(0);

    pub(crate) fn from_index(index: usize) -> BlockId {
        BlockId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("b{}", self.0))
    }
}

/// Outgoing edge of a sealed block
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockEnd {
    /// Leave the method (the opcode is one of the `*return` family)
    Return { opcode: u8 },

    /// Unconditional jump
    Jump(BlockId),

    /// Compare the two `int`s on top of the stack
    Branch {
        condition: BranchCondition,
        if_true: BlockId,
        if_false: BlockId,
    },
}

/// Straight-line run of instructions under construction
///
/// Every instruction is checked against the tracked frame as it is appended: the types it pops
/// must be on top of the stack (in order) and the types it pushes are then added. Once the
/// outgoing edge is declared the block is sealed and no more instructions can be added.
#[derive(Debug)]
pub struct BasicBlock {
    id: BlockId,

    /// Frame on entry (this is what goes in the stack map table if the block is a jump target)
    entry_frame: Frame,

    /// Frame after the instructions emitted so far
    frame: Frame,

    max_stack: Offset,
    max_locals: Offset,

    /// Encoded instructions, not including the edge
    code: Vec<u8>,

    end: Option<BlockEnd>,

    /// Declared result type of the enclosing method (`None` for `void`)
    return_type: Option<VerificationType>,
}

impl BasicBlock {
    pub(crate) fn new(
        id: BlockId,
        entry_frame: Frame,
        return_type: Option<VerificationType>,
    ) -> BasicBlock {
        let mut max_stack = Offset(0);
        let mut max_locals = Offset(0);
        entry_frame.update_maximums(&mut max_locals, &mut max_stack);
        BasicBlock {
            id,
            frame: entry_frame.clone(),
            entry_frame,
            max_stack,
            max_locals,
            code: vec![],
            end: None,
            return_type,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn entry_frame(&self) -> &Frame {
        &self.entry_frame
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn end(&self) -> Option<BlockEnd> {
        self.end
    }

    pub fn is_sealed(&self) -> bool {
        self.end.is_some()
    }

    pub fn max_stack(&self) -> Offset {
        self.max_stack
    }

    pub fn max_locals(&self) -> Offset {
        self.max_locals
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.end {
            None => Ok(()),
            Some(_) => Err(Error::BlockAlreadySealed(self.id)),
        }
    }

    /// Record the new high-water marks after a frame change
    fn update_maximums(&mut self) {
        self.frame
            .update_maximums(&mut self.max_locals, &mut self.max_stack);
    }

    /// Run a frame update, attributing failures to `instruction`
    ///
    /// The frame is only replaced if the whole update succeeds.
    fn verify<T>(
        &mut self,
        instruction: &str,
        update: impl FnOnce(&mut Frame) -> Result<T, VerifierErrorKind>,
    ) -> Result<T, Error> {
        self.check_open()?;
        let mut frame = self.frame.clone();
        let result = update(&mut frame).map_err(|kind| Error::VerifierError {
            instruction: instruction.to_owned(),
            kind,
        })?;
        self.frame = frame;
        self.update_maximums();
        Ok(result)
    }

    /// Allocate the next free local variable slot(s) for a value of the given type
    pub fn reserve_local(&mut self, vtype: VerificationType) -> Result<u16, Error> {
        self.verify("reserve", |frame| frame.reserve_local(vtype))
    }

    /// Push the value of a local variable
    pub fn load_local(&mut self, slot: u16) -> Result<(), Error> {
        let vtype = self.verify("load", |frame| frame.local(slot))?;
        let access = LocalAccess::load(vtype).ok_or_else(|| Error::VerifierError {
            instruction: format!("load {}", slot),
            kind: VerifierErrorKind::NotLoadable,
        })?;
        self.verify(access.mnemonic, |frame| {
            frame.push(vtype);
            Ok(())
        })?;
        access.encode(slot, &mut self.code);
        Ok(())
    }

    /// Pop the top of the stack into a local variable
    pub fn store_local(&mut self, slot: u16) -> Result<(), Error> {
        let vtype = self.verify("store", |frame| frame.local(slot))?;
        let access = LocalAccess::store(vtype).ok_or_else(|| Error::VerifierError {
            instruction: format!("store {}", slot),
            kind: VerifierErrorKind::NotLoadable,
        })?;
        self.verify(access.mnemonic, |frame| frame.pop_expecting(vtype))?;
        access.encode(slot, &mut self.code);
        Ok(())
    }

    /// Push an `int` constant, using the shortest encoding
    pub fn push_int(&mut self, pool: &mut ConstantsPool, value: i32) -> Result<(), Error> {
        self.check_open()?;
        let (mnemonic, encoded) = match value {
            -1..=5 => ("iconst", vec![(opcode::ICONST_M1 as i32 + 1 + value) as u8]),
            -128..=127 => ("bipush", vec![opcode::BIPUSH, value as i8 as u8]),
            -32768..=32767 => {
                let [hi, lo] = (value as i16).to_be_bytes();
                ("sipush", vec![opcode::SIPUSH, hi, lo])
            }
            _ => {
                let index = pool.get_integer(value)?;
                match u8::try_from(index.0) {
                    Ok(narrow) => ("ldc", vec![opcode::LDC, narrow]),
                    Err(_) => {
                        let [hi, lo] = index.0.to_be_bytes();
                        ("ldc_w", vec![opcode::LDC_W, hi, lo])
                    }
                }
            }
        };
        self.verify(mnemonic, |frame| {
            frame.push(VerificationType::Integer);
            Ok(())
        })?;
        self.code.extend(encoded);
        Ok(())
    }

    /// Emit an instruction with a 2-byte constant pool operand
    fn emit_indexed(&mut self, opcode: u8, index: u16) {
        self.code.push(opcode);
        self.code.extend_from_slice(&index.to_be_bytes());
    }

    /// Push the value of a static field
    pub fn get_static(&mut self, pool: &mut ConstantsPool, field: &FieldRef) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_field_ref_for(field)?;
        let field_type = field.field_type.verification_type(pool)?;
        self.verify("getstatic", |frame| {
            frame.push(field_type);
            Ok(())
        })?;
        self.emit_indexed(opcode::GETSTATIC, index.0 .0);
        Ok(())
    }

    /// Pop an object, push the value of one of its fields
    pub fn get_field(&mut self, pool: &mut ConstantsPool, field: &FieldRef) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_field_ref_for(field)?;
        let owner = VerificationType::Object(pool.get_class_named(&field.class)?);
        let field_type = field.field_type.verification_type(pool)?;
        self.verify("getfield", |frame| {
            frame.pop_expecting(owner)?;
            frame.push(field_type);
            Ok(())
        })?;
        self.emit_indexed(opcode::GETFIELD, index.0 .0);
        Ok(())
    }

    /// Pop a value into a static field
    pub fn put_static(&mut self, pool: &mut ConstantsPool, field: &FieldRef) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_field_ref_for(field)?;
        let field_type = field.field_type.verification_type(pool)?;
        self.verify("putstatic", |frame| frame.pop_expecting(field_type))?;
        self.emit_indexed(opcode::PUTSTATIC, index.0 .0);
        Ok(())
    }

    /// Pop a value and an object, storing the value in a field of the object
    pub fn put_field(&mut self, pool: &mut ConstantsPool, field: &FieldRef) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_field_ref_for(field)?;
        let owner = VerificationType::Object(pool.get_class_named(&field.class)?);
        let field_type = field.field_type.verification_type(pool)?;
        self.verify("putfield", |frame| {
            frame.pop_expecting(field_type)?;
            frame.pop_expecting(owner)
        })?;
        self.emit_indexed(opcode::PUTFIELD, index.0 .0);
        Ok(())
    }

    /// Push the default (all fields zeroed) instance of a value class
    pub fn default_value(&mut self, pool: &mut ConstantsPool, class: &str) -> Result<(), Error> {
        self.check_open()?;
        let class = pool.get_class_named(class)?;
        self.verify("defaultvalue", |frame| {
            frame.push(VerificationType::Object(class));
            Ok(())
        })?;
        self.emit_indexed(opcode::DEFAULTVALUE, class.0 .0);
        Ok(())
    }

    /// Pop a value and a value class instance, push a copy of the instance with the field set
    pub fn with_field(&mut self, pool: &mut ConstantsPool, field: &FieldRef) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_field_ref_for(field)?;
        let owner = VerificationType::Object(pool.get_class_named(&field.class)?);
        let field_type = field.field_type.verification_type(pool)?;
        self.verify("withfield", |frame| {
            frame.pop_expecting(field_type)?;
            frame.pop_expecting(owner)?;
            frame.push(owner);
            Ok(())
        })?;
        self.emit_indexed(opcode::WITHFIELD, index.0 .0);
        Ok(())
    }

    /// Pop the arguments of a static method and push its result (if it has one)
    pub fn invoke_static(
        &mut self,
        pool: &mut ConstantsPool,
        method: &MethodRef,
    ) -> Result<(), Error> {
        self.check_open()?;
        let index = pool.get_method_ref_for(method)?;
        let parameters = method
            .descriptor
            .parameters
            .iter()
            .map(|parameter| parameter.verification_type(pool))
            .collect::<Result<Vec<_>, _>>()?;
        let return_type = match &method.descriptor.return_type {
            Some(return_type) => Some(return_type.verification_type(pool)?),
            None => None,
        };
        self.verify("invokestatic", |frame| {
            for parameter in parameters.iter().rev() {
                frame.pop_expecting(*parameter)?;
            }
            if let Some(return_type) = return_type {
                frame.push(return_type);
            }
            Ok(())
        })?;
        self.emit_indexed(opcode::INVOKESTATIC, index.0 .0);
        Ok(())
    }

    /// Pop two operands of the given kind and push the result
    ///
    /// Shifts pop an `int` shift distance (on top) followed by the value being shifted.
    pub fn arithmetic(&mut self, op: ArithmeticOp, kind: NumericKind) -> Result<(), Error> {
        let mnemonic = op.mnemonic(kind);
        let opcode = op.opcode(kind).ok_or_else(|| Error::VerifierError {
            instruction: mnemonic.clone(),
            kind: VerifierErrorKind::NotIntegral(kind),
        })?;
        let operand = kind.verification_type();
        let top_operand = if op.is_shift() {
            VerificationType::Integer
        } else {
            operand
        };
        self.verify(&mnemonic, |frame| {
            frame.pop_expecting(top_operand)?;
            frame.pop_expecting(operand)?;
            frame.push(operand);
            Ok(())
        })?;
        self.code.push(opcode);
        Ok(())
    }

    /// Negate the operand on top of the stack
    pub fn negate(&mut self, kind: NumericKind) -> Result<(), Error> {
        let operand = kind.verification_type();
        self.verify(&negate_mnemonic(kind), |frame| {
            frame.pop_expecting(operand)?;
            frame.push(operand);
            Ok(())
        })?;
        self.code.push(negate_opcode(kind));
        Ok(())
    }

    /// Discard the top of the stack (`pop2` for `long` and `double`)
    pub fn pop(&mut self) -> Result<(), Error> {
        let popped = self.verify("pop", |frame| frame.pop())?;
        self.code.push(match popped.width() {
            1 => opcode::POP,
            _ => opcode::POP2,
        });
        Ok(())
    }

    /// Duplicate the top of the stack (`dup2` for `long` and `double`)
    pub fn dup(&mut self) -> Result<(), Error> {
        let top = self.verify("dup", |frame| {
            let top = frame.pop()?;
            frame.push(top);
            frame.push(top);
            Ok(top)
        })?;
        self.code.push(match top.width() {
            1 => opcode::DUP,
            _ => opcode::DUP2,
        });
        Ok(())
    }

    fn seal(&mut self, end: BlockEnd) -> Result<(), Error> {
        self.check_open()?;
        self.end = Some(end);
        Ok(())
    }

    /// Seal the block with a `return` from a `void` method
    pub fn return_void(&mut self) -> Result<(), Error> {
        self.check_open()?;
        if let Some(expected) = self.return_type {
            return Err(Error::ReturnTypeMismatch {
                expected: Some(expected),
                found: None,
            });
        }
        self.seal(BlockEnd::Return {
            opcode: opcode::RETURN,
        })
    }

    /// Seal the block by returning the value on top of the stack
    pub fn return_value(&mut self) -> Result<(), Error> {
        self.check_open()?;
        let found = *self.frame.stack.last().ok_or_else(|| Error::VerifierError {
            instruction: String::from("return"),
            kind: VerifierErrorKind::EmptyStack,
        })?;
        let mismatch = Error::ReturnTypeMismatch {
            expected: self.return_type,
            found: Some(found),
        };
        let expected = match self.return_type {
            Some(expected) if VerificationType::is_assignable(&found, &expected) => expected,
            _ => return Err(mismatch),
        };
        let opcode = return_opcode(expected).ok_or(mismatch)?;
        self.frame.pop().map_err(|kind| Error::VerifierError {
            instruction: String::from("return"),
            kind,
        })?;
        self.seal(BlockEnd::Return { opcode })
    }

    /// Seal the block with an unconditional jump
    pub fn jump(&mut self, target: BlockId) -> Result<(), Error> {
        self.seal(BlockEnd::Jump(target))
    }

    /// Seal the block by comparing the two `int`s on top of the stack
    ///
    /// Control goes to `if_true` when `value1 <condition> value2` holds (`value2` being the top of
    /// the stack), to `if_false` otherwise.
    pub fn branch(
        &mut self,
        condition: BranchCondition,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<(), Error> {
        self.check_open()?;
        if condition.negated_compare_opcode().is_none() {
            return Err(Error::UnsupportedBranchCondition(condition));
        }
        self.verify(condition.negated_compare_mnemonic(), |frame| {
            frame.pop_expecting(VerificationType::Integer)?;
            frame.pop_expecting(VerificationType::Integer)
        })?;
        self.seal(BlockEnd::Branch {
            condition,
            if_true,
            if_false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{BaseType, FieldType, MethodDescriptor};
    use crate::util::OffsetVec;

    fn block(locals: Vec<VerificationType>, return_type: Option<VerificationType>) -> BasicBlock {
        let frame = Frame::new(locals.into_iter().collect(), OffsetVec::new());
        BasicBlock::new(BlockId::ENTRY, frame, return_type)
    }

    fn stack(block: &BasicBlock) -> Vec<VerificationType> {
        block.frame().stack.iter().map(|(_, t)| *t).collect()
    }

    #[test]
    fn int_constants_use_shortest_form() {
        let mut pool = ConstantsPool::new();
        let mut b = block(vec![], None);
        for value in [-1, 5, 6, -128, 128, -32768, 32768] {
            b.push_int(&mut pool, value).unwrap();
        }
        assert_eq!(
            b.code(),
            &[
                0x02, 0x08, 0x10, 6, 0x10, 0x80, 0x11, 0, 128, 0x11, 0x80, 0, 0x12, 1
            ]
        );
        assert_eq!(b.max_stack(), Offset(7));
        assert_eq!(pool.get_integer(32768).unwrap().0, 1);
    }

    #[test]
    fn loads_and_stores_follow_slot_types() {
        let mut b = block(vec![VerificationType::Integer, VerificationType::Long], None);
        assert_eq!(b.max_locals(), Offset(3));
        let slot = b.reserve_local(VerificationType::Double).unwrap();
        assert_eq!(slot, 3);
        assert_eq!(b.max_locals(), Offset(5));

        b.load_local(1).unwrap();
        b.load_local(0).unwrap();
        assert_eq!(
            b.store_local(1).unwrap_err().to_string(),
            "`lstore` does not verify: expected Long but found Integer"
        );
        b.store_local(0).unwrap();
        b.store_local(1).unwrap();
        assert_eq!(b.code(), &[0x1f, 0x1a, 0x3b, 0x40]);
        assert_eq!(b.max_stack(), Offset(3));
        assert!(stack(&b).is_empty());

        assert!(matches!(
            b.load_local(2),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::UnreservedLocal(2),
                ..
            })
        ));
    }

    #[test]
    fn arithmetic_checks_operands() {
        let mut pool = ConstantsPool::new();
        let mut b = block(vec![VerificationType::Long], None);
        b.load_local(0).unwrap();
        b.push_int(&mut pool, 3).unwrap();
        b.arithmetic(ArithmeticOp::Shl, NumericKind::Long).unwrap();
        b.negate(NumericKind::Long).unwrap();
        assert_eq!(stack(&b), vec![VerificationType::Long]);

        assert!(matches!(
            b.arithmetic(ArithmeticOp::Add, NumericKind::Long),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::EmptyStack,
                ..
            })
        ));
        assert!(matches!(
            b.arithmetic(ArithmeticOp::Xor, NumericKind::Double),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::NotIntegral(NumericKind::Double),
                ..
            })
        ));
        b.dup().unwrap();
        b.arithmetic(ArithmeticOp::Mul, NumericKind::Long).unwrap();
        b.pop().unwrap();
        assert_eq!(b.code(), &[0x1e, 0x06, 0x79, 0x75, 0x5c, 0x69, 0x58]);
        assert_eq!(b.max_stack(), Offset(4));
    }

    #[test]
    fn failed_instructions_leave_the_frame_alone() {
        let mut b = block(vec![], None);
        b.negate(NumericKind::Int).unwrap_err();
        assert!(b.code().is_empty());
        assert!(stack(&b).is_empty());
    }

    #[test]
    fn fields_and_static_calls() {
        let mut pool = ConstantsPool::new();
        let point = FieldRef {
            class: "Point".into(),
            name: "x".into(),
            field_type: FieldType::Base(BaseType::Int),
        };
        let counter = FieldRef {
            class: "Point".into(),
            name: "count".into(),
            field_type: FieldType::Base(BaseType::Long),
        };
        let max = MethodRef {
            class: "java/lang/Math".into(),
            name: "max".into(),
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int(), FieldType::int()],
                return_type: Some(FieldType::int()),
            },
            is_interface: false,
        };

        let mut b = block(vec![], None);
        b.default_value(&mut pool, "Point").unwrap();
        b.push_int(&mut pool, 4).unwrap();
        b.with_field(&mut pool, &point).unwrap();
        b.get_field(&mut pool, &point).unwrap();
        b.push_int(&mut pool, 1).unwrap();
        b.invoke_static(&mut pool, &max).unwrap();
        b.pop().unwrap();
        b.get_static(&mut pool, &counter).unwrap();
        b.put_static(&mut pool, &counter).unwrap();
        assert!(stack(&b).is_empty());
        assert_eq!(b.max_stack(), Offset(2));

        let point_class = pool.get_class_named("Point").unwrap();
        let x_ref = pool.get_field_ref_for(&point).unwrap();
        assert_eq!(&b.code()[0..3], &[0xcb, 0, point_class.0 .0 as u8]);
        assert_eq!(&b.code()[4..7], &[0xcc, 0, x_ref.0 .0 as u8]);
        assert_eq!(b.code()[7], 0xb4);
    }

    #[test]
    fn put_field_needs_the_owner_below_the_value() {
        let mut pool = ConstantsPool::new();
        let field = FieldRef {
            class: "Point".into(),
            name: "x".into(),
            field_type: FieldType::int(),
        };
        let mut b = block(vec![], None);
        b.push_int(&mut pool, 0).unwrap();
        b.push_int(&mut pool, 0).unwrap();
        assert!(matches!(
            b.put_field(&mut pool, &field),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::InvalidType {
                    found: VerificationType::Integer,
                    ..
                },
                ..
            })
        ));
        assert_eq!(b.frame().stack.len(), 2);
    }

    #[test]
    fn sealing() {
        let mut pool = ConstantsPool::new();
        let mut b = block(vec![], Some(VerificationType::Integer));
        assert!(matches!(
            b.return_void(),
            Err(Error::ReturnTypeMismatch {
                expected: Some(VerificationType::Integer),
                found: None
            })
        ));
        assert!(matches!(
            b.branch(BranchCondition::Lt, BlockId(1), BlockId(2)),
            Err(Error::UnsupportedBranchCondition(BranchCondition::Lt))
        ));
        b.push_int(&mut pool, 1).unwrap();
        b.return_value().unwrap();
        assert_eq!(
            b.end(),
            Some(BlockEnd::Return {
                opcode: opcode::IRETURN
            })
        );
        assert!(matches!(b.jump(BlockId(1)), Err(Error::BlockAlreadySealed(_))));
        assert!(matches!(
            b.push_int(&mut pool, 1),
            Err(Error::BlockAlreadySealed(_))
        ));
    }
}
