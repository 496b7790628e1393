//! Monotonic counters exported via `Engine::get_stats` (spec.md §4.5, §6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
    /// Diagnostic-only: DropNewest replacements (folded into `dropped` for P5's
    /// accounting, see DESIGN.md; kept distinct here so a caller can tell how much of
    /// `dropped` came from eviction versus an outright drop/timeout).
    replaced: AtomicU64,
}

/// Per-stage counters, keyed by stage name (`"window"`, `"agg"`, `"sink"`, ...).
#[derive(Clone)]
pub struct Stats {
    global: Arc<Counters>,
    per_stage: Arc<dashmap::DashMap<String, Arc<Counters>>>,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    pub errors: u64,
    pub replaced: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self { global: Arc::new(Counters::default()), per_stage: Arc::new(dashmap::DashMap::new()) }
    }

    fn stage_counters(&self, stage: &str) -> Arc<Counters> {
        self.per_stage.entry(stage.to_string()).or_insert_with(|| Arc::new(Counters::default())).clone()
    }

    pub fn record_received(&self, stage: &str) {
        self.global.received.fetch_add(1, Ordering::Relaxed);
        self.stage_counters(stage).received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, stage: &str) {
        self.global.sent.fetch_add(1, Ordering::Relaxed);
        self.stage_counters(stage).sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, stage: &str) {
        self.global.dropped.fetch_add(1, Ordering::Relaxed);
        self.stage_counters(stage).dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replaced(&self, stage: &str) {
        // DropNewest replacements count as drops for P5's `received == sent + dropped +
        // in_flight` invariant to hold universally; `replaced` is kept alongside for
        // diagnostics (see DESIGN.md's resolution of the spec's scenario-2 ambiguity).
        self.global.dropped.fetch_add(1, Ordering::Relaxed);
        self.global.replaced.fetch_add(1, Ordering::Relaxed);
        self.stage_counters(stage).replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, stage: &str) {
        self.global.errors.fetch_add(1, Ordering::Relaxed);
        self.stage_counters(stage).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.global.received.load(Ordering::Relaxed),
            sent: self.global.sent.load(Ordering::Relaxed),
            dropped: self.global.dropped.load(Ordering::Relaxed),
            errors: self.global.errors.load(Ordering::Relaxed),
            replaced: self.global.replaced.load(Ordering::Relaxed),
        }
    }

    pub fn per_stage_snapshot(&self) -> HashMap<String, StatsSnapshot> {
        self.per_stage
            .iter()
            .map(|e| {
                let c = e.value();
                (
                    e.key().clone(),
                    StatsSnapshot {
                        received: c.received.load(Ordering::Relaxed),
                        sent: c.sent.load(Ordering::Relaxed),
                        dropped: c.dropped.load(Ordering::Relaxed),
                        errors: c.errors.load(Ordering::Relaxed),
                        replaced: c.replaced.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }
}
