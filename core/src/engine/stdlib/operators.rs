//! Operator reporters

use std::cmp::Ordering;

use crate::engine::primitives::{arg, Args, PrimitiveRegistry, PrimitiveResult};
use crate::engine::util::BlockUtility;
use crate::engine::value::Value;

pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register("operator_add", |args: &Args, _: &mut BlockUtility<'_>| {
        arithmetic(args, |a, b| a + b)
    });
    registry.register("operator_subtract", |args: &Args, _: &mut BlockUtility<'_>| {
        arithmetic(args, |a, b| a - b)
    });
    registry.register("operator_multiply", |args: &Args, _: &mut BlockUtility<'_>| {
        arithmetic(args, |a, b| a * b)
    });
    registry.register("operator_divide", |args: &Args, _: &mut BlockUtility<'_>| {
        arithmetic(args, |a, b| a / b)
    });
    registry.register("operator_lt", |args: &Args, _: &mut BlockUtility<'_>| {
        comparison(args, Ordering::Less)
    });
    registry.register("operator_gt", |args: &Args, _: &mut BlockUtility<'_>| {
        comparison(args, Ordering::Greater)
    });
    registry.register("operator_equals", |args: &Args, _: &mut BlockUtility<'_>| {
        comparison(args, Ordering::Equal)
    });
    registry.register("operator_and", and);
    registry.register("operator_or", or);
    registry.register("operator_not", not);
    registry.register("operator_join", join);
}

fn arithmetic(args: &Args, op: impl Fn(f64, f64) -> f64) -> PrimitiveResult {
    let a = arg(args, "NUM1").to_number();
    let b = arg(args, "NUM2").to_number();
    Ok(Value::Num(op(a, b)).into())
}

fn comparison(args: &Args, expected: Ordering) -> PrimitiveResult {
    let ordering = arg(args, "OPERAND1").compare(&arg(args, "OPERAND2"));
    Ok(Value::Bool(ordering == expected).into())
}

pub fn and(args: &Args, _util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let result = arg(args, "OPERAND1").to_bool() && arg(args, "OPERAND2").to_bool();
    Ok(Value::Bool(result).into())
}

pub fn or(args: &Args, _util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let result = arg(args, "OPERAND1").to_bool() || arg(args, "OPERAND2").to_bool();
    Ok(Value::Bool(result).into())
}

pub fn not(args: &Args, _util: &mut BlockUtility<'_>) -> PrimitiveResult {
    Ok(Value::Bool(!arg(args, "OPERAND").to_bool()).into())
}

pub fn join(args: &Args, _util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let joined = format!("{}{}", arg(args, "STRING1"), arg(args, "STRING2"));
    Ok(Value::Str(joined).into())
}
