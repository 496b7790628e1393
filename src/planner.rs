//! §6 "Parser-facing interface": the only coupling between SQL syntax and the core.
//! `Planner::plan` turns a SQL string into the `QueryPlan` data model from `plan.rs`.
//!
//! The concrete grammar is intentionally out of the core's scope (spec.md §1), but a
//! runnable engine needs *a* planner, so `SqlPlanner` here implements the subset spec.md's
//! own scenarios exercise: `SELECT <cols> FROM <stream> [WHERE <expr>] GROUP BY <fields>,
//! <WindowCall> [HAVING <expr>] [LIMIT <n>]`. It builds on `sqlparser`, the crate
//! `datafusion`'s own SQL front end (`datafusion/sql`) uses for the same job, for overall
//! statement shape (SELECT list / FROM / WHERE / HAVING / LIMIT); the `GROUP BY` list is
//! re-split from the re-serialized clause text and fed through a tiny call-or-identifier
//! matcher here, since that keeps this module decoupled from `sqlparser`'s `GroupByExpr`
//! representation (the one part of its AST that has changed shape release to release).

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{SelectItem, SetExpr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use crate::error::{Result, Stage, StreamSqlError};
use crate::plan::{ColumnKind, QueryPlan, SelectColumn, WindowKind, WindowSpec};
use crate::registry::{FunctionRegistry, Role};

pub trait Planner: Send + Sync {
    fn plan(&self, sql: &str) -> Result<QueryPlan>;
}

pub struct SqlPlanner {
    registry: FunctionRegistry,
}

impl SqlPlanner {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }
}

impl Planner for SqlPlanner {
    fn plan(&self, sql: &str) -> Result<QueryPlan> {
        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)
            .map_err(|e| StreamSqlError::syntax(Stage::Parse, e.to_string()))?;
        let stmt = statements
            .into_iter()
            .next()
            .ok_or_else(|| StreamSqlError::syntax(Stage::Parse, "empty statement"))?;
        let query = match stmt {
            Statement::Query(q) => q,
            other => {
                return Err(StreamSqlError::syntax(
                    Stage::Parse,
                    format!("expected a SELECT statement, got {other}"),
                ))
            }
        };
        let select = match query.body.as_ref() {
            SetExpr::Select(s) => s.as_ref(),
            other => {
                return Err(StreamSqlError::syntax(
                    Stage::Parse,
                    format!("expected a simple SELECT, got {other}"),
                ))
            }
        };

        let mut select_columns = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            let (alias, expr_sql) = match item {
                SelectItem::UnnamedExpr(e) => (default_alias(&e.to_string()), e.to_string()),
                SelectItem::ExprWithAlias { expr, alias } => (alias.value.clone(), expr.to_string()),
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                    return Err(StreamSqlError::syntax(Stage::Parse, "wildcard projections are not supported"))
                }
            };
            let kind = classify_column(&expr_sql, &self.registry);
            select_columns.push(SelectColumn { alias, expression: expr_sql, kind });
        }

        let filter = select.selection.as_ref().map(|e| e.to_string());
        let having = select.having.as_ref().map(|e| e.to_string());
        let limit = query
            .limit
            .as_ref()
            .and_then(|e| e.to_string().parse::<usize>().ok());

        let (group_fields, window) = parse_group_by(&query.to_string())?;

        Ok(QueryPlan {
            select_columns,
            group_fields,
            emit_window_metadata: window.is_some(),
            window,
            filter,
            having,
            limit,
        })
    }
}

fn default_alias(expr_sql: &str) -> String {
    expr_sql.to_string()
}

static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").unwrap());

/// Classify a select expression per spec.md §3/§4.3: a single top-level call to a
/// registered aggregator or analytical function takes that path, everything else
/// (bare fields and scalar expressions alike) is evaluated per row with last-value-wins.
fn classify_column(expr_sql: &str, registry: &FunctionRegistry) -> ColumnKind {
    if let Some(caps) = CALL_RE.captures(expr_sql.trim()) {
        let name = caps[1].to_string();
        let arg_expr = caps[2].trim().to_string();
        if let Some(desc) = registry.get(&name) {
            match desc.role {
                Role::Aggregator => return ColumnKind::Aggregate { function: desc.name, arg_expr },
                Role::Analytical => return ColumnKind::Analytical { function: desc.name, arg_expr },
                _ => {}
            }
        }
    }
    ColumnKind::Scalar
}

static GROUP_BY_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bGROUP BY\b(.*?)(\bHAVING\b|\bORDER BY\b|\bLIMIT\b|$)").unwrap());

static WINDOW_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)$").unwrap());

fn parse_group_by(normalized_sql: &str) -> Result<(Vec<String>, Option<WindowSpec>)> {
    let Some(caps) = GROUP_BY_CLAUSE.captures(normalized_sql) else {
        return Ok((Vec::new(), None));
    };
    let clause = caps[1].trim();
    if clause.is_empty() {
        return Ok((Vec::new(), None));
    }
    let mut group_fields = Vec::new();
    let mut window = None;
    for piece in split_top_level_commas(clause) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if let Some(caps) = WINDOW_CALL.captures(piece) {
            let name = caps[1].to_string();
            let args = split_top_level_commas(&caps[2]);
            window = Some(parse_window_call(&name, &args)?);
        } else {
            group_fields.push(piece.trim_matches('"').to_string());
        }
    }
    Ok((group_fields, window))
}

fn split_top_level_commas(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut cur = String::new();
    for c in s.chars() {
        match c {
            '\'' => {
                in_quote = !in_quote;
                cur.push(c);
            }
            '(' if !in_quote => {
                depth += 1;
                cur.push(c);
            }
            ')' if !in_quote => {
                depth -= 1;
                cur.push(c);
            }
            ',' if !in_quote && depth == 0 => {
                out.push(std::mem::take(&mut cur));
            }
            _ => cur.push(c),
        }
    }
    if !cur.trim().is_empty() {
        out.push(cur);
    }
    out
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches('\'').trim_matches('"')
}

fn parse_window_call(name: &str, args: &[String]) -> Result<WindowSpec> {
    let base = |kind: WindowKind| WindowSpec { kind, timestamp_field: None, allowed_lateness: Duration::ZERO };
    let kind = match name.to_lowercase().as_str() {
        "tumblingwindow" => {
            let size = parse_duration(strip_quotes(args.first().ok_or_else(missing_arg)?))?;
            WindowKind::Tumbling { size }
        }
        "slidingwindow" => {
            let size = parse_duration(strip_quotes(args.first().ok_or_else(missing_arg)?))?;
            let slide = parse_duration(strip_quotes(args.get(1).ok_or_else(missing_arg)?))?;
            WindowKind::Sliding { size, slide }
        }
        "sessionwindow" => {
            let gap = parse_duration(strip_quotes(args.first().ok_or_else(missing_arg)?))?;
            WindowKind::Session { gap }
        }
        "countingwindow" => {
            let count: u64 = strip_quotes(args.first().ok_or_else(missing_arg)?)
                .parse()
                .map_err(|_| StreamSqlError::syntax(Stage::Parse, "CountingWindow expects an integer count"))?;
            WindowKind::Counting { count }
        }
        other => {
            return Err(StreamSqlError::UnsupportedWindow {
                stage: Stage::Plan,
                message: format!("unknown window function '{other}'"),
            })
        }
    };
    Ok(base(kind))
}

fn missing_arg() -> StreamSqlError {
    StreamSqlError::syntax(Stage::Parse, "window function missing a required argument")
}

/// Parses durations like `1s`, `200ms`, `30s`, `2h`, `15m` (spec.md scenarios use `'1s'`
/// style literals throughout).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let split_at = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (num, unit) = s.split_at(split_at);
    let n: f64 = num
        .parse()
        .map_err(|_| StreamSqlError::syntax(Stage::Parse, format!("invalid duration '{s}'")))?;
    let millis = match unit {
        "ms" => n,
        "s" | "" => n * 1000.0,
        "m" => n * 60_000.0,
        "h" => n * 3_600_000.0,
        other => {
            return Err(StreamSqlError::syntax(Stage::Parse, format!("unknown duration unit '{other}'")))
        }
    };
    Ok(Duration::from_millis(millis as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tumbling_sum_scenario_1() {
        let registry = FunctionRegistry::with_builtins();
        let planner = SqlPlanner::new(registry);
        let plan = planner
            .plan("SELECT deviceId, sum(v) FROM s GROUP BY deviceId, TumblingWindow('1s')")
            .unwrap();
        assert_eq!(plan.group_fields, vec!["deviceId".to_string()]);
        assert!(matches!(plan.window.as_ref().unwrap().kind, WindowKind::Tumbling { .. }));
        assert_eq!(plan.select_columns.len(), 2);
        assert!(matches!(plan.select_columns[1].kind, ColumnKind::Aggregate { .. }));
    }

    #[test]
    fn parses_sliding_window_with_two_args() {
        let registry = FunctionRegistry::with_builtins();
        let planner = SqlPlanner::new(registry);
        let plan = planner
            .plan("SELECT deviceId, avg(v) FROM s GROUP BY deviceId, SlidingWindow('1s', '200ms') HAVING avg(v) > 0")
            .unwrap();
        match plan.window.unwrap().kind {
            WindowKind::Sliding { size, slide } => {
                assert_eq!(size, Duration::from_secs(1));
                assert_eq!(slide, Duration::from_millis(200));
            }
            other => panic!("expected sliding window, got {other:?}"),
        }
        assert!(plan.having.is_some());
    }

    #[test]
    fn parses_counting_window() {
        let registry = FunctionRegistry::with_builtins();
        let planner = SqlPlanner::new(registry);
        let plan = planner.plan("SELECT count(v) FROM s GROUP BY CountingWindow(100)").unwrap();
        assert!(matches!(plan.window.unwrap().kind, WindowKind::Counting { count: 100 }));
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("200ms").unwrap(), Duration::from_millis(200));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }
}
