use super::*;

fn with_callee(main: FunctionPrototype, callee: FunctionPrototype) -> Context {
    Context::new(vec![main, callee])
}

#[test]
fn recursive_fib() {
    let main = main_proto(vec![Value::Int(10)], vec![
        push(Flag::K, 0),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 1),
        op(Opcode::Ret),
    ]);
    let ctx = with_callee(main, fib());
    assert_eq!(ctx.run_entry(&[]).unwrap(), Value::Int(55));
}

#[test]
fn call_passes_arguments_in_push_order() {
    let sub = FunctionPrototype::new("sub")
        .with_args(2)
        .with_var_names(["a", "b"])
        .with_code(vec![push(Flag::V, 0), push(Flag::V, 1), op(Opcode::Sub), op(Opcode::Ret)]);
    let main = main_proto(vec![Value::Int(10), Value::Int(3)], vec![
        push(Flag::K, 0),
        push(Flag::K, 1),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 2),
        op(Opcode::Ret),
    ]);
    assert_eq!(with_callee(main, sub).run_entry(&[]).unwrap(), Value::Int(7));
}

#[test]
fn missing_arguments_stay_nil() {
    let second = FunctionPrototype::new("second")
        .with_args(2)
        .with_var_names(["a", "b"])
        .with_code(vec![push(Flag::V, 1), op(Opcode::Ret)]);
    let ctx = Context::new(vec![second]);
    assert_eq!(ctx.run_entry(&[Value::Int(1)]).unwrap(), Value::Nil);
}

#[test]
fn extra_arguments_are_dropped() {
    let first = FunctionPrototype::new("first")
        .with_args(1)
        .with_var_names(["a", "tmp"])
        .with_code(vec![push(Flag::V, 1), op(Opcode::Ret)]);
    let ctx = Context::new(vec![first]);
    // Slot 1 is a local, not a parameter, so the second argument never lands.
    let args = [Value::Int(1), Value::Int(2), Value::Int(3)];
    assert_eq!(ctx.run_entry(&args).unwrap(), Value::Nil);
}

#[test]
fn call_result_replaces_callee_and_args() {
    let one = FunctionPrototype::new("one")
        .with_constants(vec![Value::Int(1)])
        .with_code(vec![push(Flag::K, 0), op(Opcode::Ret)]);
    let main = main_proto(vec![Value::from("below")], vec![
        push(Flag::K, 0),
        push(Flag::N, 0),
        push(Flag::N, 0),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 2),
    ]);
    let ctx = with_callee(main, one);
    let mut act = entry(&ctx);
    for _ in 0..5 {
        act.step().unwrap();
    }
    assert_eq!(act.sp(), 2);
    assert_eq!(act.stack_slot(0), Some(&Value::from("below")));
    assert_eq!(act.stack_slot(1), Some(&Value::Int(1)));
}

#[test]
fn each_f_read_is_a_new_function() {
    let ctx = with_callee(main_proto(vec![], vec![]), FunctionPrototype::new("f"));
    let act = entry(&ctx);
    let a = act.get_val(Flag::F, 1).unwrap();
    let b = act.get_val(Flag::F, 1).unwrap();
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    let (Value::Func(fa), Value::Func(fb)) = (&a, &b) else {
        panic!("expected functions, got {a:?} and {b:?}");
    };
    assert!(Arc::ptr_eq(fa.prototype(), fb.prototype()));
    assert_eq!(fa.name(), "f");
}

#[test]
fn calling_a_non_function_is_a_type_mismatch() {
    let ctx = Context::new(vec![main_proto(vec![Value::Int(3)], vec![
        push(Flag::K, 0),
        with_ix(Opcode::Call, 0),
    ])]);
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    assert!(matches!(
        err,
        VmError::TypeMismatch {
            expected: Kind::Func,
            found: Kind::Int
        }
    ));
    assert_eq!(act.sp(), 1);
}

#[test]
fn call_with_too_few_operands_leaves_stack() {
    let ctx = with_callee(
        main_proto(vec![], vec![push(Flag::F, 1), with_ix(Opcode::Call, 2)]),
        FunctionPrototype::new("f"),
    );
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    assert!(matches!(err, VmError::MalformedBytecode(BytecodeFault::StackUnderflow)));
    assert_eq!(act.sp(), 1);
}

#[test]
fn callee_fault_unwinds_to_host() {
    let div = FunctionPrototype::new("div")
        .with_args(1)
        .with_var_names(["x"])
        .with_constants(vec![Value::Int(0)])
        .with_code(vec![push(Flag::V, 0), push(Flag::K, 0), op(Opcode::Div), op(Opcode::Ret)]);
    let main = main_proto(vec![Value::Int(1)], vec![
        push(Flag::K, 0),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 1),
        op(Opcode::Ret),
    ]);
    let err = with_callee(main, div).run_entry(&[]).unwrap_err();
    assert!(matches!(err, VmError::DivisionByZero));
}

#[test]
fn host_can_call_function_values() {
    let ctx = Context::new(vec![main_proto(vec![], vec![]), fib()]);
    let f = ctx.instantiate(1).unwrap();
    assert_eq!(ctx.call(&f, &[Value::Int(12)]).unwrap(), Value::Int(144));
    assert!(matches!(
        ctx.instantiate(2),
        Err(VmError::MalformedBytecode(BytecodeFault::PrototypeOutOfRange { index: 2, len: 2 }))
    ));
}

#[test]
fn entry_without_prototypes_is_malformed() {
    let err = Context::default().run_entry(&[]).unwrap_err();
    assert!(err.is_malformed());
}

#[test]
fn function_values_flow_through_variables() {
    // Stash a function in a slot, then call it from there.
    let main = main_proto(vec![Value::Int(6)], vec![
        push(Flag::F, 1),
        store(0),
        push(Flag::K, 0),
        push(Flag::V, 0),
        with_ix(Opcode::Call, 1),
        op(Opcode::Ret),
    ])
    .with_var_names(["f"]);
    let ctx = with_callee(main, fib());
    assert_eq!(ctx.run_entry(&[]).unwrap(), Value::Int(8));
}
