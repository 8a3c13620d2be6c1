//! Primitive registry
//!
//! Maps opcodes to block implementations. Built once when extensions
//! register, then consulted by the executor on every block. Unknown opcodes
//! come back as `None`, never as an error.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot;

use super::errors::PrimitiveError;
use super::stdlib;
use super::util::BlockUtility;
use super::value::Value;

/// Evaluated inputs and fields of a block, by name
pub type Args = HashMap<String, Value>;

/// What a primitive produced
#[derive(Debug)]
pub enum Reported {
    /// Command block, or a reporter with nothing to say
    Nothing,
    /// Value for the parent's waiting input
    Value(Value),
    /// Result arrives later; the thread waits for it
    Pending(oneshot::Receiver<Value>),
}

impl From<Value> for Reported {
    fn from(v: Value) -> Self {
        Reported::Value(v)
    }
}

pub type PrimitiveResult = Result<Reported, PrimitiveError>;

pub type Primitive = Box<dyn Fn(&Args, &mut BlockUtility<'_>) -> PrimitiveResult>;

/// Metadata for hat (script-starting) opcodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HatInfo {
    /// A new trigger resets a live thread instead of being ignored
    pub restart_existing_threads: bool,
    /// Re-armed every tick; the hat's predicate gates the script on a rising edge
    pub edge_activated: bool,
}

#[derive(Default)]
pub struct PrimitiveRegistry {
    primitives: HashMap<String, Primitive>,
    hats: HashMap<String, HatInfo>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in catalog
    pub fn with_stdlib() -> Self {
        let mut registry = Self::new();
        stdlib::register_all(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, opcode: impl Into<String>, primitive: F)
    where
        F: Fn(&Args, &mut BlockUtility<'_>) -> PrimitiveResult + 'static,
    {
        self.primitives.insert(opcode.into(), Box::new(primitive));
    }

    pub fn register_hat(&mut self, opcode: impl Into<String>, info: HatInfo) {
        self.hats.insert(opcode.into(), info);
    }

    pub fn get(&self, opcode: &str) -> Option<&Primitive> {
        self.primitives.get(opcode)
    }

    pub fn hat(&self, opcode: &str) -> Option<&HatInfo> {
        self.hats.get(opcode)
    }

    pub fn is_hat(&self, opcode: &str) -> bool {
        self.hats.contains_key(opcode)
    }

    pub fn contains(&self, opcode: &str) -> bool {
        self.primitives.contains_key(opcode) || self.hats.contains_key(opcode)
    }
}

impl fmt::Debug for PrimitiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<&String> = self.primitives.keys().collect();
        opcodes.sort();
        f.debug_struct("PrimitiveRegistry")
            .field("primitives", &opcodes)
            .field("hats", &self.hats)
            .finish()
    }
}

/* ===================== Argument helpers ===================== */

/// Argument by name, Null when absent
pub fn arg(args: &Args, name: &str) -> Value {
    args.get(name).cloned().unwrap_or_default()
}

/// Argument by name, error when absent
pub fn require<'a>(args: &'a Args, name: &str) -> Result<&'a Value, PrimitiveError> {
    args.get(name)
        .ok_or_else(|| PrimitiveError::MissingArgument(name.to_string()))
}

/// Argument that must be a non-empty string (variable and broadcast names)
pub fn require_name(args: &Args, name: &str) -> Result<String, PrimitiveError> {
    match require(args, name)? {
        Value::Str(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(PrimitiveError::WrongArgumentType {
            name: name.to_string(),
            expected: "a non-empty name",
        }),
    }
}
