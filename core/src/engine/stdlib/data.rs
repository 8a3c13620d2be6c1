//! Variable blocks

use crate::engine::primitives::{arg, require_name, Args, PrimitiveRegistry, PrimitiveResult, Reported};
use crate::engine::util::BlockUtility;

pub fn register(registry: &mut PrimitiveRegistry) {
    registry.register("data_variable", variable);
    registry.register("data_setvariableto", set_variable_to);
    registry.register("data_changevariableby", change_variable_by);
}

pub fn variable(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let name = require_name(args, "VARIABLE")?;
    Ok(util.variables().get(&name).into())
}

pub fn set_variable_to(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let name = require_name(args, "VARIABLE")?;
    util.variables_mut().set(name, arg(args, "VALUE"));
    Ok(Reported::Nothing)
}

pub fn change_variable_by(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let name = require_name(args, "VARIABLE")?;
    let delta = arg(args, "VALUE").to_number();
    util.variables_mut().change_by(&name, delta);
    Ok(Reported::Nothing)
}
