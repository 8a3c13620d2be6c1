//! Flat variable store shared by every script

use std::collections::BTreeMap;

use super::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a variable; unknown names read as 0
    pub fn get(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Num(0.0))
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Add to a variable numerically
    pub fn change_by(&mut self, name: &str, delta: f64) -> Value {
        let next = Value::Num(self.get(name).to_number() + delta);
        self.values.insert(name.to_string(), next.clone());
        next
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}
