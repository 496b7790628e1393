//! C4: the window engine. Assigns each incoming row to one or more `WindowSlot`s and
//! decides when a slot is done accepting rows (spec.md §4.4).
//!
//! Every strategy instance tracks its own per-group state and walks the same state
//! machine: a group starts `Opening` its first slot, spends most of its life `Accepting`
//! rows, moves to `Triggered` either because a new row rolled the slot over or because a
//! scheduler tick found the slot's end time has passed, and is `Flushing` for the one call
//! that drains it back to the caller. `Closed` is terminal, reached only from
//! `WindowStrategy::close` at engine shutdown.

pub mod counting;
pub mod session;
pub mod sliding;
pub mod tumbling;

use crate::plan::{WindowKind, WindowSpec};
use crate::row::{Row, WindowSlot};
use crate::runtime::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Opening,
    Accepting,
    Triggered,
    Flushing,
    Closed,
}

/// One completed window's rows, ready for `AggEngine::finalize_batch`.
#[derive(Debug)]
pub struct WindowBatch {
    pub slot: WindowSlot,
    pub rows: Vec<Row>,
}

/// A window assignment/trigger strategy. Implementations own per-group state internally,
/// keyed by the group tuple string computed from the `GroupFields` passed at construction.
pub trait WindowStrategy: Send {
    /// Assigns `row` to its slot(s); may immediately trigger and return completed batches
    /// (tumbling/sliding rolling over, or a session gap being exceeded by the new row).
    fn add(&mut self, row: Row, stats: &Stats) -> Vec<WindowBatch>;

    /// Time-driven trigger check, invoked by the scheduler independent of row arrival so a
    /// slot with no further rows still closes once its end time (or session gap) elapses.
    fn tick(&mut self, now_ms: i64, stats: &Stats) -> Vec<WindowBatch>;

    /// Flushes every still-open window, called once at shutdown.
    fn close(&mut self) -> Vec<WindowBatch>;
}

pub fn build(spec: &WindowSpec, group_fields: Vec<String>) -> Box<dyn WindowStrategy> {
    let lateness_ms = spec.allowed_lateness.as_millis() as i64;
    let ts_field = spec.timestamp_field.clone();
    match spec.kind {
        WindowKind::Tumbling { size } => {
            Box::new(tumbling::TumblingWindow::new(size.as_millis() as i64, lateness_ms, ts_field, group_fields))
        }
        WindowKind::Sliding { size, slide } => Box::new(sliding::SlidingWindow::new(
            size.as_millis() as i64,
            slide.as_millis() as i64,
            ts_field,
            group_fields,
        )),
        WindowKind::Session { gap } => {
            Box::new(session::SessionWindow::new(gap.as_millis() as i64, ts_field, group_fields))
        }
        WindowKind::Counting { count } => Box::new(counting::CountingWindow::new(count, group_fields)),
    }
}

/// Event-time if `ts_field` names a row column that holds an integer millisecond
/// timestamp, otherwise the row's ingest timestamp (spec.md §4.4 "Timestamp source").
pub(crate) fn event_time(row: &Row, ts_field: &Option<String>) -> i64 {
    match ts_field {
        Some(field) => row.get(field).and_then(|v| v.as_i64().ok()).unwrap_or(row.timestamp),
        None => row.timestamp,
    }
}

pub(crate) fn group_key_of(row: &Row, group_fields: &[String]) -> String {
    crate::row::group_key(row, group_fields)
}
