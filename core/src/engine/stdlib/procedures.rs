//! Custom procedures: definitions, calls and argument reporters

use tracing::warn;

use crate::engine::blocks::{PROCCODE_FIELD, PROCEDURE_CALL, PROCEDURE_DEFINITION};
use crate::engine::primitives::{require_name, Args, HatInfo, PrimitiveRegistry, PrimitiveResult, Reported};
use crate::engine::util::BlockUtility;
use crate::engine::value::Value;

pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register_hat(PROCEDURE_DEFINITION, HatInfo::default());
    registry.register(PROCEDURE_CALL, call);
    registry.register("argument_reporter_string_number", argument);
    registry.register("argument_reporter_boolean", argument_boolean);
}

/// Bind every input as a parameter on the call's frame, then enter the body
pub fn call(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let proccode = require_name(args, PROCCODE_FIELD)?;
    for (name, value) in args.iter().filter(|(name, _)| *name != PROCCODE_FIELD) {
        util.push_param(name.clone(), value.clone());
    }
    if !util.start_procedure(&proccode) {
        warn!(procedure = %proccode, "procedure is not defined");
    }
    Ok(Reported::Nothing)
}

/// Unbound parameters read as 0
pub fn argument(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let name = require_name(args, "VALUE")?;
    let value = util.param(&name).cloned().unwrap_or(Value::Num(0.0));
    Ok(value.into())
}

pub fn argument_boolean(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let name = require_name(args, "VALUE")?;
    let value = util.param(&name).is_some_and(|v| v.to_bool());
    Ok(Value::Bool(value).into())
}
