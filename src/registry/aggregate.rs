//! Built-in incremental aggregators: sum, count, avg, min, max, first, last.
//! Each is its own small accumulator implementing `Aggregator` (spec.md §3); the registry
//! only ever hands out fresh instances via the factory closure.

use std::sync::Arc;

use crate::aggregator::instance::Aggregator;
use crate::error::Result;
use crate::registry::{Descriptor, FunctionRegistry, Payload, Role};
use crate::value::Value;

fn desc(name: &str, aliases: &[&str], f: impl Fn() -> Box<dyn Aggregator> + Send + Sync + 'static) -> Descriptor {
    Descriptor {
        name: name.to_string(),
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        role: Role::Aggregator,
        min_args: 1,
        max_args: 1,
        category: "aggregate".to_string(),
        description: String::new(),
        payload: Payload::Aggregator(Arc::new(f)),
    }
}

pub fn register_builtins(reg: &FunctionRegistry) {
    let _ = reg.register(desc("sum", &[], || Box::new(Sum::default())));
    let _ = reg.register(desc("count", &[], || Box::new(Count::default())));
    let _ = reg.register(desc("avg", &["mean"], || Box::new(Avg::default())));
    let _ = reg.register(desc("min", &[], || Box::new(MinMax::new(true))));
    let _ = reg.register(desc("max", &[], || Box::new(MinMax::new(false))));
    let _ = reg.register(desc("first", &[], || Box::new(FirstLast::new(true))));
    let _ = reg.register(desc("last", &[], || Box::new(FirstLast::new(false))));
}

#[derive(Default, Clone)]
struct Sum {
    total: f64,
    is_float: bool,
}

impl Aggregator for Sum {
    fn add(&mut self, value: &Value) -> Result<()> {
        if matches!(value, Value::Float(_)) {
            self.is_float = true;
        }
        self.total += value.as_f64()?;
        Ok(())
    }
    fn result(&self) -> Value {
        if self.is_float { Value::Float(self.total) } else { Value::Int(self.total as i64) }
    }
    fn reset(&mut self) {
        self.total = 0.0;
        self.is_float = false;
    }
    fn clone_box(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

#[derive(Default, Clone)]
struct Count {
    n: i64,
}

impl Aggregator for Count {
    fn add(&mut self, _value: &Value) -> Result<()> {
        self.n += 1;
        Ok(())
    }
    fn result(&self) -> Value {
        Value::Int(self.n)
    }
    fn reset(&mut self) {
        self.n = 0;
    }
    fn clone_box(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

#[derive(Default, Clone)]
struct Avg {
    total: f64,
    n: i64,
}

impl Aggregator for Avg {
    fn add(&mut self, value: &Value) -> Result<()> {
        self.total += value.as_f64()?;
        self.n += 1;
        Ok(())
    }
    fn result(&self) -> Value {
        if self.n == 0 { Value::Null } else { Value::Float(self.total / self.n as f64) }
    }
    fn reset(&mut self) {
        self.total = 0.0;
        self.n = 0;
    }
    fn clone_box(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
struct MinMax {
    is_min: bool,
    current: Option<Value>,
}

impl MinMax {
    fn new(is_min: bool) -> Self {
        Self { is_min, current: None }
    }
}

impl Aggregator for MinMax {
    fn add(&mut self, value: &Value) -> Result<()> {
        self.current = Some(match self.current.take() {
            None => value.clone(),
            Some(cur) => {
                let ord = value.partial_cmp_coerced(&cur)?;
                let take_new = if self.is_min { ord.is_lt() } else { ord.is_gt() };
                if take_new { value.clone() } else { cur }
            }
        });
        Ok(())
    }
    fn result(&self) -> Value {
        self.current.clone().unwrap_or(Value::Null)
    }
    fn reset(&mut self) {
        self.current = None;
    }
    fn clone_box(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

/// `first`/`last` — tie-breaks on arrival order per group, as documented in spec.md §4.3.
#[derive(Clone)]
struct FirstLast {
    keep_first: bool,
    current: Option<Value>,
}

impl FirstLast {
    fn new(keep_first: bool) -> Self {
        Self { keep_first, current: None }
    }
}

impl Aggregator for FirstLast {
    fn add(&mut self, value: &Value) -> Result<()> {
        if self.keep_first {
            if self.current.is_none() {
                self.current = Some(value.clone());
            }
        } else {
            self.current = Some(value.clone());
        }
        Ok(())
    }
    fn result(&self) -> Value {
        self.current.clone().unwrap_or(Value::Null)
    }
    fn reset(&mut self) {
        self.current = None;
    }
    fn clone_box(&self) -> Box<dyn Aggregator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_is_commutative_under_permutation() {
        let values = [Value::Int(1), Value::Int(2), Value::Int(10)];
        let mut forward = Sum::default();
        for v in &values {
            forward.add(v).unwrap();
        }
        let mut reversed = Sum::default();
        for v in values.iter().rev() {
            reversed.add(v).unwrap();
        }
        assert_eq!(forward.result(), reversed.result());
    }

    #[test]
    fn min_max_track_extremes() {
        let mut min = MinMax::new(true);
        let mut max = MinMax::new(false);
        for v in [Value::Int(3), Value::Int(-1), Value::Int(7)] {
            min.add(&v).unwrap();
            max.add(&v).unwrap();
        }
        assert_eq!(min.result(), Value::Int(-1));
        assert_eq!(max.result(), Value::Int(7));
    }
}
