//! C1: the process-wide (or, here, engine-scoped — see spec.md §9 "Global state")
//! name -> descriptor map. One `FunctionRegistry` per `Engine`; `dashmap` gives us
//! lock-free-friendly concurrent reads the way `datafusion` and `openobserve` both use it
//! for their own function/catalog registries, rather than a single coarse `RwLock`.

pub mod aggregate;
pub mod analytical;
pub mod scalar;

use std::sync::Arc;

use dashmap::DashMap;

use crate::aggregator::instance::{Aggregator, Analytical};
use crate::error::{Stage, StreamSqlError};
use crate::value::Value;

pub type ScalarFn = Arc<dyn Fn(&[Value]) -> crate::error::Result<Value> + Send + Sync>;
pub type AggregatorFactory = Arc<dyn Fn() -> Box<dyn Aggregator> + Send + Sync>;
pub type AnalyticalFactory = Arc<dyn Fn() -> Box<dyn Analytical> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Scalar,
    Aggregator,
    Analytical,
    Window,
}

#[derive(Clone)]
pub enum Payload {
    Scalar(ScalarFn),
    Aggregator(AggregatorFactory),
    Analytical(AnalyticalFactory),
    /// `Window` descriptors are metadata-only markers (the window kinds a `Planner` may
    /// reference by name); the engine does not dispatch through this payload.
    Window,
}

#[derive(Clone)]
pub struct Descriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub role: Role,
    pub min_args: usize,
    /// `-1` means unbounded (spec.md §4.1).
    pub max_args: i64,
    pub category: String,
    pub description: String,
    pub payload: Payload,
}

impl Descriptor {
    pub fn check_arity(&self, got: usize) -> crate::error::Result<()> {
        let fits_max = self.max_args < 0 || (got as i64) <= self.max_args;
        if got < self.min_args || !fits_max {
            return Err(StreamSqlError::ArgCountMismatch {
                stage: Stage::Plan,
                name: self.name.clone(),
                min: self.min_args,
                max: self.max_args,
                got,
            });
        }
        Ok(())
    }
}

/// Engine-scoped registry (spec.md §9 recommends hiding the would-be process-wide
/// singleton behind a handle to avoid cross-test contamination).
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    by_name: Arc<DashMap<String, Descriptor>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self { by_name: Arc::new(DashMap::new()) }
    }

    /// Built-in catalogue: the starter scalar/aggregate/analytical functions (SPEC_FULL.md
    /// §E). Callers may register more before the first `Execute`.
    pub fn with_builtins() -> Self {
        let reg = Self::new();
        scalar::register_builtins(&reg);
        aggregate::register_builtins(&reg);
        analytical::register_builtins(&reg);
        reg
    }

    /// Fails with `DuplicateName` if the canonical name or any alias already collides
    /// with an existing entry (spec.md §4.1).
    pub fn register(&self, desc: Descriptor) -> crate::error::Result<()> {
        let mut keys = Vec::with_capacity(1 + desc.aliases.len());
        keys.push(desc.name.to_lowercase());
        for a in &desc.aliases {
            keys.push(a.to_lowercase());
        }
        for k in &keys {
            if self.by_name.contains_key(k) {
                log::warn!("rejected duplicate function registration: {}", desc.name);
                return Err(StreamSqlError::DuplicateName(desc.name.clone()));
            }
        }
        for k in keys {
            self.by_name.insert(k, desc.clone());
        }
        Ok(())
    }

    /// Case-insensitive lookup (spec.md §4.1, P7 in §8).
    pub fn get(&self, name: &str) -> Option<Descriptor> {
        self.by_name.get(&name.to_lowercase()).map(|r| r.clone())
    }

    /// Snapshot for diagnostics; deduplicated by canonical name.
    pub fn list_all(&self) -> Vec<Descriptor> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for entry in self.by_name.iter() {
            if seen.insert(entry.value().name.clone()) {
                out.push(entry.value().clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_rejected() {
        let reg = FunctionRegistry::new();
        let desc = Descriptor {
            name: "double".into(),
            aliases: vec![],
            role: Role::Scalar,
            min_args: 1,
            max_args: 1,
            category: "math".into(),
            description: "".into(),
            payload: Payload::Scalar(Arc::new(|args| args[0].as_f64().map(|f| Value::Float(f * 2.0)))),
        };
        assert!(reg.register(desc.clone()).is_ok());
        assert!(matches!(reg.register(desc), Err(StreamSqlError::DuplicateName(_))));
    }

    #[test]
    fn case_insensitive_resolution() {
        let reg = FunctionRegistry::with_builtins();
        let a = reg.get("SUM").unwrap();
        let b = reg.get("sum").unwrap();
        let c = reg.get("Sum").unwrap();
        assert_eq!(a.name, b.name);
        assert_eq!(b.name, c.name);
    }
}
