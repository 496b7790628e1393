//! The query plan shape consumed by the core (spec.md §3 "Query Plan", §6 "Parser-facing
//! interface"). This is the only coupling between SQL syntax and the engine; a `Planner`
//! produces one of these from a query string.

use std::time::Duration;

#[derive(Debug, Clone)]
pub enum WindowKind {
    Tumbling { size: Duration },
    Sliding { size: Duration, slide: Duration },
    Session { gap: Duration },
    Counting { count: u64 },
}

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub kind: WindowKind,
    /// Row field read as the event-time source; `None` means ingest wall-clock (§4.4).
    pub timestamp_field: Option<String>,
    /// How far behind the watermark a row may arrive before being dropped as late (§4.4).
    pub allowed_lateness: Duration,
}

/// A single output column: an alias and the expression that produces it. `kind` records
/// which of C3's three evaluation paths (plain field / scalar expression / aggregator or
/// analytical call) the column takes, resolved once at plan time against the registry.
#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub alias: String,
    pub expression: String,
    pub kind: ColumnKind,
}

#[derive(Debug, Clone)]
pub enum ColumnKind {
    /// A bare field reference or a scalar expression with no aggregator/analytical call;
    /// re-evaluated per row, last value wins (spec.md §4.3 step 2).
    Scalar,
    /// A single top-level call to an aggregator function, e.g. `sum(v)`. `function` is the
    /// registry name, `arg_expr` its one argument expression.
    Aggregate { function: String, arg_expr: String },
    /// A single top-level call to an analytical function, e.g. `lag(v)`.
    Analytical { function: String, arg_expr: String },
}

#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub select_columns: Vec<SelectColumn>,
    pub group_fields: Vec<String>,
    pub window: Option<WindowSpec>,
    pub filter: Option<String>,
    pub having: Option<String>,
    pub limit: Option<usize>,
    /// Whether `window_start`/`window_end` metadata fields should be added to output rows.
    pub emit_window_metadata: bool,
}
