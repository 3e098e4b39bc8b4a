use anyhow::{Result, bail};

use super::*;

fn count_args(_ctx: &Context, args: &[Value]) -> Result<Value> {
    Ok(Value::Int(args.len() as i64))
}

fn concat(_ctx: &Context, args: &[Value]) -> Result<Value> {
    let mut out = String::new();
    for arg in args {
        out.push_str(&arg.to_str()?);
    }
    Ok(Value::from(out))
}

fn fail(_ctx: &Context, _args: &[Value]) -> Result<Value> {
    bail!("boom")
}

/// `apply(f, x)` calls back into the VM with `f(x)`.
fn apply(ctx: &Context, args: &[Value]) -> Result<Value> {
    let Some(f) = args.first().and_then(Value::as_func) else {
        bail!("apply expects a function first");
    };
    Ok(ctx.call(f, &args[1..])?)
}

fn call_native(name: &str, argc: u64, consts: Vec<Value>) -> Context {
    let mut code: Vec<Instruction> = (0..consts.len() as u64).map(|i| push(Flag::K, i)).collect();
    code.push(push(Flag::F, 1));
    code.push(with_ix(Opcode::Call, argc));
    code.push(op(Opcode::Ret));
    Context::new(vec![main_proto(consts, code), FunctionPrototype::native(name)])
}

#[test]
fn native_receives_every_argument() {
    let mut ctx = call_native("count", 3, vec![Value::Int(1), Value::Nil, Value::from("x")]);
    ctx.register_native("count", count_args);
    // Natives declare no parameters but still see all three.
    assert_eq!(ctx.run_entry(&[]).unwrap(), Value::Int(3));
}

#[test]
fn native_arguments_keep_push_order() {
    let mut ctx = call_native("concat", 3, vec![Value::from("a"), Value::Int(1), Value::from("b")]);
    ctx.register_native("concat", concat);
    assert_eq!(ctx.run_entry(&[]).unwrap(), Value::from("a1b"));
}

#[test]
fn unregistered_native_leaves_stack_untouched() {
    let ctx = call_native("missing", 1, vec![Value::Int(5)]);
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    match err {
        VmError::NativeFunctionNotFound(name) => assert_eq!(name, "missing"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(act.sp(), 2);
    assert_eq!(act.stack_slot(0), Some(&Value::Int(5)));
    assert!(matches!(act.stack_slot(1), Some(Value::Func(_))));
}

#[test]
fn native_failure_is_wrapped_with_its_name() {
    let mut ctx = call_native("fail", 0, vec![]);
    ctx.register_native("fail", fail);
    let err = ctx.run_entry(&[]).unwrap_err();
    assert_eq!(err.to_string(), "native function `fail` failed: boom");
    assert!(matches!(err, VmError::Native { ref name, .. } if name == "fail"));
}

#[test]
fn native_can_reenter_the_vm() {
    let double = FunctionPrototype::new("double")
        .with_args(1)
        .with_var_names(["x"])
        .with_code(vec![push(Flag::V, 0), push(Flag::V, 0), op(Opcode::Add), op(Opcode::Ret)]);
    let main = main_proto(vec![Value::Int(21)], vec![
        push(Flag::F, 2),
        push(Flag::K, 0),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 2),
        op(Opcode::Ret),
    ]);
    let mut ctx = Context::new(vec![main, FunctionPrototype::native("apply"), double]);
    ctx.register_native("apply", apply);
    assert_eq!(ctx.run_entry(&[]).unwrap(), Value::Int(42));
}

#[test]
fn reentrant_fault_surfaces_through_native() {
    let bad = FunctionPrototype::new("bad").with_code(vec![op(Opcode::Add)]);
    let main = main_proto(vec![], vec![
        push(Flag::F, 2),
        push(Flag::F, 1),
        with_ix(Opcode::Call, 1),
        op(Opcode::Ret),
    ]);
    let mut ctx = Context::new(vec![main, FunctionPrototype::native("apply"), bad]);
    ctx.register_native("apply", apply);
    let err = ctx.run_entry(&[]).unwrap_err();
    let source = match err {
        VmError::Native { source, .. } => source,
        other => panic!("expected a native error, got {other:?}"),
    };
    let inner = source.downcast_ref::<VmError>().expect("inner VM error");
    assert!(matches!(inner, VmError::MalformedBytecode(BytecodeFault::StackUnderflow)));
}

#[test]
fn registration_replaces_previous_binding() {
    let mut ctx = Context::default();
    assert!(ctx.register_native("n", count_args).is_none());
    assert!(ctx.register_native("n", concat).is_some());
    let native = ctx.native("n").unwrap();
    assert_eq!(native(&ctx, &[Value::from("z")]).unwrap(), Value::from("z"));
    assert!(ctx.native("other").is_none());
}

#[test]
fn host_call_of_native_function() {
    let mut ctx = Context::new(vec![FunctionPrototype::native("count")]);
    ctx.register_native("count", count_args);
    let f = ctx.instantiate(0).unwrap();
    assert_eq!(ctx.call(&f, &[Value::Nil, Value::Nil]).unwrap(), Value::Int(2));
    assert_eq!(Function::name(&f), "count");
}
