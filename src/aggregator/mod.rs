//! C3: incremental aggregation over one window batch (spec.md §4.3).
//!
//! `AggEngine::finalize_batch` takes the rows the window engine flushed for a single
//! `WindowSlot` and folds them into one output row per distinct `GroupFields` tuple, the
//! same "keyed bucket map, drained once, one row per bucket" shape `aggregator_core`'s
//! `TimeWindowAggregator` uses for its own correlation windows.

pub mod instance;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::expr;
use crate::plan::{ColumnKind, QueryPlan};
use crate::registry::{FunctionRegistry, Payload, Role};
use crate::row::{group_key, windowed_group_key, Data, Row, WindowSlot};
use crate::runtime::stats::Stats;
use crate::value::Value;
use instance::{Aggregator, Analytical};

struct Bucket {
    group_values: Data,
    aggregators: BTreeMap<String, Box<dyn Aggregator>>,
    last_scalar: BTreeMap<String, Value>,
}

/// Owns the long-lived `Analytical` instances (one per select column, surviving across
/// window boundaries) and drives per-batch aggregation. One `AggEngine` per running query.
pub struct AggEngine {
    plan: QueryPlan,
    registry: FunctionRegistry,
    analytical: BTreeMap<String, Box<dyn Analytical>>,
}

impl AggEngine {
    pub fn new(plan: QueryPlan, registry: FunctionRegistry) -> Self {
        let mut analytical = BTreeMap::new();
        for col in &plan.select_columns {
            if let ColumnKind::Analytical { function, .. } = &col.kind {
                if let Some(desc) = registry.get(function) {
                    if let Payload::Analytical(factory) = &desc.payload {
                        analytical.insert(col.alias.clone(), factory());
                    }
                }
            }
        }
        Self { plan, registry, analytical }
    }

    /// Folds `rows` (all belonging to one `WindowSlot`) into output rows, one per distinct
    /// group tuple, applying `HAVING` and `LIMIT` last (spec.md §4.3 steps 1-5).
    pub fn finalize_batch(&mut self, rows: &[Row], slot: Option<WindowSlot>, stats: &Stats) -> Result<Vec<Row>> {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();

        for row in rows {
            let gk = group_key(row, &self.plan.group_fields);
            let bucket = buckets.entry(gk.clone()).or_insert_with(|| {
                order.push(gk.clone());
                let mut group_values = Data::new();
                for field in &self.plan.group_fields {
                    group_values.insert(field.clone(), row.data.get(field).cloned().unwrap_or(Value::Null));
                }
                Bucket { group_values, aggregators: BTreeMap::new(), last_scalar: BTreeMap::new() }
            });

            for col in &self.plan.select_columns {
                match &col.kind {
                    ColumnKind::Scalar => match expr::evaluate(&col.expression, row, &self.registry) {
                        Ok(v) => {
                            bucket.last_scalar.insert(col.alias.clone(), v);
                        }
                        Err(e) => {
                            log::warn!("scalar column '{}' evaluation failed: {e}", col.alias);
                            stats.record_error("agg");
                        }
                    },
                    ColumnKind::Aggregate { function, arg_expr } => {
                        let v = match expr::evaluate(arg_expr, row, &self.registry) {
                            Ok(v) => v,
                            Err(e) => {
                                log::warn!("aggregate column '{}' argument evaluation failed: {e}", col.alias);
                                stats.record_error("agg");
                                continue;
                            }
                        };
                        let agg = bucket.aggregators.entry(col.alias.clone()).or_insert_with(|| {
                            self.registry
                                .get(function)
                                .and_then(|d| match d.payload {
                                    Payload::Aggregator(factory) => Some(factory()),
                                    _ => None,
                                })
                                .expect("planner only emits Aggregate columns for registered aggregator names")
                        });
                        if let Err(e) = agg.add(&v) {
                            log::warn!("aggregator '{function}' rejected a value for '{}': {e}", col.alias);
                            stats.record_error("agg");
                        }
                    }
                    ColumnKind::Analytical { arg_expr, .. } => {
                        let v = match expr::evaluate(arg_expr, row, &self.registry) {
                            Ok(v) => v,
                            Err(e) => {
                                log::warn!("analytical column '{}' argument evaluation failed: {e}", col.alias);
                                stats.record_error("agg");
                                continue;
                            }
                        };
                        if let Some(inst) = self.analytical.get_mut(&col.alias) {
                            match inst.add(&v) {
                                Ok(out) => {
                                    bucket.last_scalar.insert(col.alias.clone(), out);
                                }
                                Err(e) => {
                                    log::warn!("analytical column '{}' failed: {e}", col.alias);
                                    stats.record_error("agg");
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut out = Vec::with_capacity(order.len());
        for key in &order {
            let Some(bucket) = buckets.remove(key) else { continue };
            let mut data = bucket.group_values;
            for col in &self.plan.select_columns {
                let v = match &col.kind {
                    ColumnKind::Aggregate { .. } => {
                        bucket.aggregators.get(&col.alias).map(|a| a.result()).unwrap_or(Value::Null)
                    }
                    ColumnKind::Scalar | ColumnKind::Analytical { .. } => {
                        bucket.last_scalar.get(&col.alias).cloned().unwrap_or(Value::Null)
                    }
                };
                data.insert(col.alias.clone(), v);
            }
            if let Some(slot) = slot {
                if self.plan.emit_window_metadata {
                    data.insert("window_start".into(), Value::Int(slot.start));
                    data.insert("window_end".into(), Value::Int(slot.end));
                }
            }
            let mut out_row = Row::new(data);
            if let Some(slot) = slot {
                out_row.timestamp = slot.end;
            }
            out.push(out_row);
        }

        if let Some(having) = &self.plan.having {
            let mut kept = Vec::with_capacity(out.len());
            for row in out {
                match expr::evaluate(having, &row, &self.registry) {
                    Ok(v) if v.as_bool() => kept.push(row),
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("HAVING evaluation failed, dropping row: {e}");
                        stats.record_error("agg");
                    }
                }
            }
            out = kept;
        }

        if let Some(limit) = self.plan.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// Key combining group tuple and window slot, exposed for callers that need to track
    /// per-window-per-group state outside this engine (e.g. session-window gap tracking).
    pub fn windowed_key(row: &Row, group_fields: &[String], slot: WindowSlot) -> String {
        windowed_group_key(&group_key(row, group_fields), slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnKind, SelectColumn};
    use crate::row::Data;

    fn row(device: &str, v: i64, ts: i64) -> Row {
        let mut data = Data::new();
        data.insert("deviceId".into(), Value::Str(device.into()));
        data.insert("v".into(), Value::Int(v));
        Row::with_timestamp(ts, data)
    }

    #[test]
    fn sums_per_group_scenario_1() {
        let registry = FunctionRegistry::with_builtins();
        let plan = QueryPlan {
            select_columns: vec![
                SelectColumn { alias: "deviceId".into(), expression: "deviceId".into(), kind: ColumnKind::Scalar },
                SelectColumn {
                    alias: "total".into(),
                    expression: "sum(v)".into(),
                    kind: ColumnKind::Aggregate { function: "sum".into(), arg_expr: "v".into() },
                },
            ],
            group_fields: vec!["deviceId".into()],
            ..Default::default()
        };
        let mut engine = AggEngine::new(plan, registry);
        let stats = Stats::new();
        let rows = vec![row("a", 1, 0), row("b", 10, 0), row("a", 2, 100)];
        let out = engine.finalize_batch(&rows, None, &stats).unwrap();
        let mut totals: BTreeMap<String, i64> = BTreeMap::new();
        for r in out {
            let device = r.data.get("deviceId").unwrap().as_str().unwrap().to_string();
            let total = r.data.get("total").unwrap().as_i64().unwrap();
            totals.insert(device, total);
        }
        assert_eq!(totals.get("a"), Some(&3));
        assert_eq!(totals.get("b"), Some(&10));
    }

    #[test]
    fn having_filters_output_rows() {
        let registry = FunctionRegistry::with_builtins();
        let plan = QueryPlan {
            select_columns: vec![
                SelectColumn { alias: "deviceId".into(), expression: "deviceId".into(), kind: ColumnKind::Scalar },
                SelectColumn {
                    alias: "total".into(),
                    expression: "sum(v)".into(),
                    kind: ColumnKind::Aggregate { function: "sum".into(), arg_expr: "v".into() },
                },
            ],
            group_fields: vec!["deviceId".into()],
            having: Some("total > 5".into()),
            ..Default::default()
        };
        let mut engine = AggEngine::new(plan, registry);
        let stats = Stats::new();
        let rows = vec![row("a", 1, 0), row("b", 10, 0)];
        let out = engine.finalize_batch(&rows, None, &stats).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data.get("deviceId").unwrap().as_str().unwrap(), "b");
    }
}
