//! In-process streaming SQL engine: windowing, incremental aggregation, pluggable
//! function dispatch, and a backpressured concurrent pipeline runtime.
//!
//! A typical caller builds a [`FunctionRegistry`] (or starts from
//! [`FunctionRegistry::with_builtins`]), turns a query string into a [`plan::QueryPlan`]
//! via a [`planner::Planner`], starts a [`runtime::Engine`] from that plan, registers one
//! or more [`runtime::Sink`]s, and feeds rows in with [`runtime::Engine::emit`].

pub mod aggregator;
pub mod config;
pub mod error;
pub mod expr;
pub mod overflow;
pub mod plan;
pub mod planner;
pub mod registry;
pub mod row;
pub mod runtime;
pub mod value;
pub mod window;

pub use config::PerformanceConfig;
pub use error::{Result, Stage, StreamSqlError};
pub use plan::QueryPlan;
pub use planner::{Planner, SqlPlanner};
pub use registry::FunctionRegistry;
pub use row::Row;
pub use runtime::{Engine, Sink, SyncFnSink};
pub use value::Value;

/// Initializes logging the way every binary in this crate does: `env_logger` driven by
/// `RUST_LOG`, defaulting to `info` when unset.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
