//! Event hats and broadcast

use std::collections::BTreeMap;

use crate::engine::primitives::{require, Args, HatInfo, PrimitiveRegistry, PrimitiveResult, Reported};
use crate::engine::scheduler::{BROADCAST_FIELD, BROADCAST_HAT, FLAG_HAT};
use crate::engine::util::BlockUtility;

pub fn register(registry: &mut PrimitiveRegistry) {
    let restart = HatInfo {
        restart_existing_threads: true,
        edge_activated: false,
    };
    registry.register_hat(FLAG_HAT, restart);
    registry.register_hat(BROADCAST_HAT, restart);
    registry.register("event_broadcast", broadcast);
}

/// Start every script listening for the message
pub fn broadcast(args: &Args, util: &mut BlockUtility<'_>) -> PrimitiveResult {
    let message = require(args, "BROADCAST_INPUT")?.to_string();
    let fields = BTreeMap::from([(BROADCAST_FIELD.to_string(), message)]);
    util.start_hats(BROADCAST_HAT, fields);
    Ok(Reported::Nothing)
}
