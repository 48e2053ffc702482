use jvmasm::jvm::class_file::{Attribute, Code, ConstantsPool, StackMapFrame, StackMapTable};
use jvmasm::jvm::code::{ArithmeticOp, BlockId, BranchCondition, MethodBuilder, NumericKind};
use jvmasm::jvm::verifier::VerificationType;
use jvmasm::jvm::Error;

fn decode(pool: &ConstantsPool, attributes: &[Attribute]) -> (Code, Vec<StackMapFrame>) {
    assert_eq!(attributes.len(), 1);
    let code = attributes[0]
        .parse_if::<Code>(pool.constants())
        .expect("not a `Code` attribute")
        .unwrap();
    let frames = match code.attributes.as_slice() {
        [] => vec![],
        [table] => table
            .parse_if::<StackMapTable>(pool.constants())
            .expect("not a `StackMapTable` attribute")
            .unwrap()
            .0,
        _ => panic!("unexpected code attributes"),
    };
    (code, frames)
}

#[test]
fn empty_void_method() {
    let mut pool = ConstantsPool::new();
    let mut method = MethodBuilder::new(vec![], None);
    let entry = method.entry();
    method.block(entry).unwrap().return_void().unwrap();

    let attributes = method.finish(&mut pool).unwrap();
    let (code, frames) = decode(&pool, &attributes);
    assert_eq!(code.max_stack, 0);
    assert_eq!(code.max_locals, 0);
    assert_eq!(code.code_array.0, vec![0xb1]);
    assert!(code.exception_table.is_empty());
    assert!(frames.is_empty());
    assert_eq!(pool.constants().len(), 1);
}

/// `static int le(int a, int b) { return a <= b ? 1 : 0; }`
#[test]
fn integer_branch() {
    let mut pool = ConstantsPool::new();
    let locals = vec![VerificationType::Integer, VerificationType::Integer];
    let mut method = MethodBuilder::new(locals.clone(), Some(VerificationType::Integer));
    let entry = method.entry();
    let if_true = method.continue_block(entry, vec![]).unwrap();
    let if_false = method.continue_block(entry, vec![]).unwrap();

    let block = method.block(entry).unwrap();
    block.load_local(0).unwrap();
    block.load_local(1).unwrap();
    block.branch(BranchCondition::Le, if_true, if_false).unwrap();

    let block = method.block(if_true).unwrap();
    block.push_int(&mut pool, 1).unwrap();
    block.return_value().unwrap();

    let block = method.block(if_false).unwrap();
    block.push_int(&mut pool, 0).unwrap();
    block.return_value().unwrap();

    let attributes = method.finish(&mut pool).unwrap();
    let (code, frames) = decode(&pool, &attributes);
    assert_eq!(
        code.code_array.0,
        vec![0x1a, 0x1b, 0xa3, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac]
    );
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 2);
    assert_eq!(
        frames,
        vec![StackMapFrame::Full {
            offset_delta: 7,
            locals,
            stack: vec![],
        }]
    );
}

/// Two branches share the same exit block, which must only be emitted once
#[test]
fn shared_target_is_emitted_once() {
    let mut pool = ConstantsPool::new();
    let int = VerificationType::Integer;
    let mut method = MethodBuilder::new(vec![int, int], Some(int));
    let entry = method.entry();
    let second_test = method.continue_block(entry, vec![]).unwrap();
    let exit = method.new_block(vec![int, int], vec![int]);
    let zero = method.continue_block(entry, vec![]).unwrap();
    let one = method.continue_block(entry, vec![]).unwrap();

    // if (a <= b) { if (b <= a) 1 else 0 } else 0, funneled through `exit`
    let block = method.block(entry).unwrap();
    block.load_local(0).unwrap();
    block.load_local(1).unwrap();
    block.branch(BranchCondition::Le, second_test, zero).unwrap();

    let block = method.block(second_test).unwrap();
    block.load_local(1).unwrap();
    block.load_local(0).unwrap();
    block.branch(BranchCondition::Le, one, zero).unwrap();

    let block = method.block(one).unwrap();
    block.push_int(&mut pool, 1).unwrap();
    block.jump(exit).unwrap();

    let block = method.block(zero).unwrap();
    block.push_int(&mut pool, 0).unwrap();
    block.jump(exit).unwrap();

    method.block(exit).unwrap().return_value().unwrap();

    let attributes = method.finish(&mut pool).unwrap();
    let (code, frames) = decode(&pool, &attributes);
    // 0: iload_0 iload_1 if_icmpgt zero
    // 5: iload_1 iload_0 if_icmpgt zero
    // 10 (one): iconst_1
    // 11 (exit): ireturn
    // 12 (zero): iconst_0 goto exit
    assert_eq!(
        code.code_array.0,
        vec![
            0x1a, 0x1b, 0xa3, 0x00, 0x0a, // 0
            0x1b, 0x1a, 0xa3, 0x00, 0x05, // 5
            0x04, // 10
            0xac, // 11
            0x03, 0xa7, 0xff, 0xfe, // 12
        ]
    );
    let returns = code.code_array.0.iter().filter(|b| **b == 0xac).count();
    assert_eq!(returns, 1);
    assert_eq!(
        frames,
        vec![
            StackMapFrame::Full {
                offset_delta: 11,
                locals: vec![int, int],
                stack: vec![int],
            },
            StackMapFrame::Full {
                offset_delta: 0,
                locals: vec![int, int],
                stack: vec![],
            },
        ]
    );
}

/// `int i = 0; while (i <= n) i = i + 2; return i;`
#[test]
fn backward_jump_to_loop_header() {
    let mut pool = ConstantsPool::new();
    let int = VerificationType::Integer;
    let mut method = MethodBuilder::new(vec![int], Some(int));
    let entry = method.entry();

    let block = method.block(entry).unwrap();
    let i = block.reserve_local(int).unwrap();
    assert_eq!(i, 1);
    block.push_int(&mut pool, 0).unwrap();
    block.store_local(i).unwrap();

    let header = method.continue_block(entry, vec![]).unwrap();
    let body = method.continue_block(entry, vec![]).unwrap();
    let exit = method.continue_block(entry, vec![]).unwrap();
    method.block(entry).unwrap().jump(header).unwrap();

    let block = method.block(header).unwrap();
    block.load_local(i).unwrap();
    block.load_local(0).unwrap();
    block.branch(BranchCondition::Le, body, exit).unwrap();

    let block = method.block(body).unwrap();
    block.load_local(i).unwrap();
    block.push_int(&mut pool, 2).unwrap();
    block.arithmetic(ArithmeticOp::Add, NumericKind::Int).unwrap();
    block.store_local(i).unwrap();
    block.jump(header).unwrap();

    let block = method.block(exit).unwrap();
    block.load_local(i).unwrap();
    block.return_value().unwrap();

    let attributes = method.finish(&mut pool).unwrap();
    let (code, frames) = decode(&pool, &attributes);
    // 0: iconst_0 istore_1
    // 2 (header): iload_1 iload_0 if_icmpgt exit
    // 7 (body): iload_1 iconst_2 iadd istore_1 goto header
    // 14 (exit): iload_1 ireturn
    assert_eq!(
        code.code_array.0,
        vec![
            0x03, 0x3c, // 0
            0x1b, 0x1a, 0xa3, 0x00, 0x0a, // 2
            0x1b, 0x05, 0x60, 0x3c, 0xa7, 0xff, 0xf7, // 7
            0x1b, 0xac, // 14
        ]
    );
    assert_eq!(code.max_locals, 2);
    assert_eq!(code.max_stack, 2);
    assert_eq!(
        frames,
        vec![
            StackMapFrame::Full {
                offset_delta: 2,
                locals: vec![int, int],
                stack: vec![],
            },
            StackMapFrame::Full {
                offset_delta: 11,
                locals: vec![int, int],
                stack: vec![],
            },
        ]
    );
}

#[test]
fn unreachable_blocks_are_dropped() {
    let mut pool = ConstantsPool::new();
    let mut method = MethodBuilder::new(vec![], None);
    let entry = method.entry();
    let orphan = method.new_block(vec![], vec![]);
    method.block(entry).unwrap().return_void().unwrap();
    method
        .block(orphan)
        .unwrap()
        .push_int(&mut pool, 1000)
        .unwrap();

    let attributes = method.finish(&mut pool).unwrap();
    let (code, _) = decode(&pool, &attributes);
    assert_eq!(code.code_array.0, vec![0xb1]);
}

#[test]
fn conflicting_frames_at_one_offset() {
    let mut pool = ConstantsPool::new();
    let int = VerificationType::Integer;
    let mut method = MethodBuilder::new(vec![int, int], None);
    let entry = method.entry();

    // `relay` has no code of its own, so `done` falls in right after it at the same offset while
    // expecting fewer locals. `other` then jumps to both of them.
    let relay = method.continue_block(entry, vec![]).unwrap();
    let done = method.new_block(vec![int], vec![]);
    let other = method.continue_block(entry, vec![]).unwrap();

    let block = method.block(entry).unwrap();
    block.load_local(0).unwrap();
    block.load_local(1).unwrap();
    block.branch(BranchCondition::Le, relay, other).unwrap();
    method.block(relay).unwrap().jump(done).unwrap();
    method.block(done).unwrap().return_void().unwrap();

    let block = method.block(other).unwrap();
    block.load_local(0).unwrap();
    block.load_local(1).unwrap();
    block.branch(BranchCondition::Le, relay, done).unwrap();

    assert!(matches!(
        method.finish(&mut pool),
        Err(Error::ConflictingFrames { offset: 5, .. })
    ));
}

#[test]
fn branch_needs_two_ints() {
    let mut pool = ConstantsPool::new();
    let mut method = MethodBuilder::new(vec![VerificationType::Long], None);
    let entry = method.entry();
    let target = method.continue_block(entry, vec![]).unwrap();
    let block = method.block(entry).unwrap();
    block.load_local(0).unwrap();
    block.push_int(&mut pool, 1).unwrap();
    assert!(matches!(
        block.branch(BranchCondition::Le, target, target),
        Err(Error::VerifierError { .. })
    ));
    assert_eq!(block.id(), BlockId::ENTRY);
    assert!(!block.is_sealed());
}
