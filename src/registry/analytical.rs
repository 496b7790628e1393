//! Built-in analytical functions: `lag`, `latest`, `had_changed`. Unlike aggregators
//! these are long-lived across window boundaries (spec.md §3, §4.3) and are evaluated
//! row-by-row in arrival order, not per-group-per-window.

use std::sync::Arc;

use crate::aggregator::instance::Analytical;
use crate::error::Result;
use crate::registry::{Descriptor, FunctionRegistry, Payload, Role};
use crate::value::Value;

fn desc(name: &str, f: impl Fn() -> Box<dyn Analytical> + Send + Sync + 'static) -> Descriptor {
    Descriptor {
        name: name.to_string(),
        aliases: vec![],
        role: Role::Analytical,
        min_args: 1,
        max_args: 1,
        category: "analytical".to_string(),
        description: String::new(),
        payload: Payload::Analytical(Arc::new(f)),
    }
}

pub fn register_builtins(reg: &FunctionRegistry) {
    let _ = reg.register(desc("lag", || Box::new(Lag::default())));
    let _ = reg.register(desc("latest", || Box::new(Latest::default())));
    let _ = reg.register(desc("had_changed", || Box::new(HadChanged::default())));
}

/// Returns the value seen on the *previous* call, or `Null` on the first.
#[derive(Default, Clone)]
struct Lag {
    previous: Option<Value>,
}

impl Analytical for Lag {
    fn add(&mut self, value: &Value) -> Result<Value> {
        let out = self.previous.clone().unwrap_or(Value::Null);
        self.previous = Some(value.clone());
        Ok(out)
    }
    fn reset(&mut self) {
        self.previous = None;
    }
    fn clone_box(&self) -> Box<dyn Analytical> {
        Box::new(self.clone())
    }
}

/// Returns the most recently seen value, including the current one.
#[derive(Default, Clone)]
struct Latest {
    current: Option<Value>,
}

impl Analytical for Latest {
    fn add(&mut self, value: &Value) -> Result<Value> {
        self.current = Some(value.clone());
        Ok(self.current.clone().unwrap())
    }
    fn reset(&mut self) {
        self.current = None;
    }
    fn clone_box(&self) -> Box<dyn Analytical> {
        Box::new(self.clone())
    }
}

/// Returns `true` the first time a value differs from the last one seen (spec.md §8
/// scenario 6: `A,A,B,B,C` -> `true,false,true,false,true`).
#[derive(Default, Clone)]
struct HadChanged {
    previous: Option<Value>,
}

impl Analytical for HadChanged {
    fn add(&mut self, value: &Value) -> Result<Value> {
        let changed = match &self.previous {
            None => true,
            Some(prev) => !prev.equals(value),
        };
        self.previous = Some(value.clone());
        Ok(Value::Bool(changed))
    }
    fn reset(&mut self) {
        self.previous = None;
    }
    fn clone_box(&self) -> Box<dyn Analytical> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn had_changed_matches_scenario_6() {
        let mut f = HadChanged::default();
        let seq = ["A", "A", "B", "B", "C"];
        let expected = [true, false, true, false, true];
        for (s, exp) in seq.iter().zip(expected.iter()) {
            let out = f.add(&Value::Str(s.to_string())).unwrap();
            assert_eq!(out, Value::Bool(*exp));
        }
    }

    #[test]
    fn lag_returns_null_on_first_call() {
        let mut f = Lag::default();
        assert_eq!(f.add(&Value::Int(1)).unwrap(), Value::Null);
        assert_eq!(f.add(&Value::Int(2)).unwrap(), Value::Int(1));
    }
}
