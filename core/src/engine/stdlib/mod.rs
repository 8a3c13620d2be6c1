//! Built-in primitives
//!
//! A small catalog organized by category. Enough to run real scripts from
//! the command line; hosts register their own opcodes next to these.

pub mod control;
pub mod data;
pub mod event;
pub mod looks;
pub mod operators;
pub mod procedures;

use super::primitives::PrimitiveRegistry;

/* ===================== Registration ===================== */

/// Register every built-in primitive and hat
pub fn register_all(registry: &mut PrimitiveRegistry) {
    control::register(registry);
    operators::register(registry);
    data::register(registry);
    event::register(registry);
    looks::register(registry);
    procedures::register(registry);
}
