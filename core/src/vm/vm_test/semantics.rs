use proptest::prelude::*;

use super::*;

fn binop(opcode: Opcode, l: Value, r: Value) -> Result<Value, VmError> {
    run_main(vec![l, r], vec![push(Flag::K, 0), push(Flag::K, 1), op(opcode), op(Opcode::Ret)])
}

fn unop(opcode: Opcode, v: Value) -> Result<Value, VmError> {
    run_main(vec![v], vec![push(Flag::K, 0), op(opcode), op(Opcode::Ret)])
}

#[test]
fn operands_apply_in_push_order() {
    assert_eq!(binop(Opcode::Add, "a".into(), "b".into()).unwrap(), Value::from("ab"));
    assert_eq!(binop(Opcode::Sub, Value::Int(10), Value::Int(4)).unwrap(), Value::Int(6));
    assert_eq!(binop(Opcode::Div, Value::Int(9), Value::Int(2)).unwrap(), Value::Int(4));
    assert_eq!(binop(Opcode::Mod, Value::Int(9), Value::Int(4)).unwrap(), Value::Int(1));
    assert_eq!(binop(Opcode::Pow, Value::Int(3), Value::Int(4)).unwrap(), Value::Int(81));
    assert_eq!(binop(Opcode::Mul, Value::Float(1.5), Value::Int(2)).unwrap(), Value::Float(3.0));
}

#[test]
fn comparisons_push_bools() {
    assert_eq!(binop(Opcode::Lt, Value::Int(1), Value::Int(2)).unwrap(), Value::Bool(true));
    assert_eq!(binop(Opcode::Gt, Value::Int(1), Value::Int(2)).unwrap(), Value::Bool(false));
    assert_eq!(binop(Opcode::Gt, Value::from("b"), Value::from("a")).unwrap(), Value::Bool(true));
    assert_eq!(binop(Opcode::Lt, Value::Int(2), Value::Int(2)).unwrap(), Value::Bool(false));
    assert_eq!(binop(Opcode::Gt, Value::Int(2), Value::Int(2)).unwrap(), Value::Bool(false));
    // Values without an order read as "less than".
    assert_eq!(binop(Opcode::Lt, Value::Nil, Value::Int(0)).unwrap(), Value::Bool(true));
}

#[test]
fn unary_ops() {
    assert_eq!(unop(Opcode::Not, Value::Int(0)).unwrap(), Value::Bool(true));
    assert_eq!(unop(Opcode::Not, Value::from("x")).unwrap(), Value::Bool(false));
    assert_eq!(unop(Opcode::Unm, Value::Int(5)).unwrap(), Value::Int(-5));
    assert_eq!(unop(Opcode::Unm, Value::Float(0.5)).unwrap(), Value::Float(-0.5));
    assert!(matches!(
        unop(Opcode::Unm, Value::Bool(true)),
        Err(VmError::InvalidOperation { kind: Kind::Bool, .. })
    ));
}

#[test]
fn failed_binary_op_keeps_operands() {
    let ctx = Context::new(vec![main_proto(vec![Value::Int(1), Value::from("x")], vec![
        push(Flag::K, 0),
        push(Flag::K, 1),
        op(Opcode::Sub),
        op(Opcode::Ret),
    ])]);
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    assert!(matches!(
        err,
        VmError::InvalidConversion {
            from: Kind::String,
            to: Kind::Int
        }
    ));
    assert_eq!(act.sp(), 2);
    assert_eq!(act.stack_slot(0), Some(&Value::Int(1)));
    assert_eq!(act.stack_slot(1), Some(&Value::from("x")));
}

#[test]
fn binary_op_with_one_operand_underflows() {
    let ctx = Context::new(vec![main_proto(vec![Value::Int(1)], vec![push(Flag::K, 0), op(Opcode::Mul)])]);
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    assert!(matches!(err, VmError::MalformedBytecode(BytecodeFault::StackUnderflow)));
    assert_eq!(act.sp(), 1);
}

#[test]
fn division_by_zero_faults() {
    assert!(matches!(
        binop(Opcode::Div, Value::Int(1), Value::Int(0)),
        Err(VmError::DivisionByZero)
    ));
    assert_eq!(
        binop(Opcode::Div, Value::Float(-1.0), Value::Int(0)).unwrap(),
        Value::Float(f64::NEG_INFINITY)
    );
}

#[test]
fn pop_to_non_variable_keeps_operand() {
    let ctx = Context::new(vec![main_proto(vec![Value::Int(4)], vec![
        push(Flag::K, 0),
        Instruction::new(Opcode::Pop, Flag::K, 0),
    ])]);
    let mut act = entry(&ctx);
    let err = act.call(&[]).unwrap_err();
    assert!(matches!(
        err,
        VmError::MalformedBytecode(BytecodeFault::InvalidFlag {
            opcode: Opcode::Pop,
            flag: Flag::K
        })
    ));
    assert_eq!(act.sp(), 1);
    assert_eq!(act.stack_slot(0), Some(&Value::Int(4)));
}

#[test]
fn pop_moves_value_into_slot() {
    let proto = main_proto(vec![Value::from("v")], vec![
        push(Flag::K, 0),
        store(1),
        push(Flag::V, 1),
        op(Opcode::Ret),
    ])
    .with_var_names(["a", "b"]);
    let ctx = Context::new(vec![proto]);
    let mut act = entry(&ctx);
    assert_eq!(act.call(&[]).unwrap(), Value::from("v"));
    assert_eq!(act.vars(), &[Value::Nil, Value::from("v")]);
}

proptest! {
    #[test]
    fn operand_order_law(a in "[a-z]{0,8}", b in "[a-z]{0,8}", x in any::<i64>(), y in any::<i64>()) {
        let joined = binop(Opcode::Add, a.as_str().into(), b.as_str().into()).unwrap();
        prop_assert_eq!(joined, Value::from(format!("{a}{b}")));
        let diff = binop(Opcode::Sub, Value::Int(x), Value::Int(y)).unwrap();
        prop_assert_eq!(diff, Value::Int(x.wrapping_sub(y)));
    }
}
