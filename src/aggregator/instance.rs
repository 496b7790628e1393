//! The two capability sets dispatched by role (spec.md §9 "Polymorphic aggregator
//! adapter"): a plain accumulator for `Aggregator` columns, and a row-by-row transform
//! for `Analytical` columns that never resets at a window boundary.

use crate::error::Result;
use crate::value::Value;

/// One accumulator per `(window, group, column)` triple (spec.md §3).
pub trait Aggregator: Send {
    fn add(&mut self, value: &Value) -> Result<()>;
    fn result(&self) -> Value;
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn Aggregator>;
}

/// One long-lived instance per `(query, column)`, surviving across window boundaries.
/// `add` both updates state and returns the value to snapshot into the row (lag, latest,
/// had_changed all need the per-row output, not just a final fold).
pub trait Analytical: Send {
    fn add(&mut self, value: &Value) -> Result<Value>;
    fn reset(&mut self);
    fn clone_box(&self) -> Box<dyn Analytical>;
}

impl Clone for Box<dyn Aggregator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl Clone for Box<dyn Analytical> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
