//! C5: the stream runtime. Wires the window engine (C4), the aggregator (C3), and
//! registered sinks into three tasks connected by the overflow-controlled hand-offs from
//! `overflow.rs`, the way `streamer_core`'s `lib.rs` wires its own ingest/process/persist
//! tasks together with `tokio::mpsc` -- generalized here to a configurable policy per
//! hand-off instead of one hard-coded `try_send`.

pub mod spill;
pub mod stats;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::aggregator::AggEngine;
use crate::config::PerformanceConfig;
use crate::error::Result;
use crate::overflow::{self, Sender as OverflowSender};
use crate::plan::QueryPlan;
use crate::registry::FunctionRegistry;
use crate::row::{Row, WindowSlot};
use crate::window::{self, WindowStrategy};
use stats::{Stats, StatsSnapshot};

/// A destination for finalized output rows. `write` receives one window's worth of output
/// rows at a time (spec.md §4.5 "Sinks"); errors are counted but never stop the pipeline.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, rows: &[Row]) -> Result<()>;
}

/// Adapts a plain synchronous closure into a `Sink`, for callers with no async work to do
/// on write (`Engine::add_sync_sink`).
pub struct SyncFnSink<F>
where
    F: Fn(&[Row]) -> Result<()> + Send + Sync,
{
    f: F,
}

impl<F> SyncFnSink<F>
where
    F: Fn(&[Row]) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Sink for SyncFnSink<F>
where
    F: Fn(&[Row]) -> Result<()> + Send + Sync,
{
    async fn write(&self, rows: &[Row]) -> Result<()> {
        (self.f)(rows)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AggInput {
    slot: Option<WindowSlot>,
    rows: Vec<Row>,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Applies `WHERE` pre-window (spec.md §3): a row that fails the filter must never reach
/// the window strategy, so it can't advance a watermark, extend a session gap, or count
/// toward a `CountingWindow`'s trigger threshold.
fn passes_filter(filter: &Option<String>, row: &Row, registry: &FunctionRegistry, stats: &Stats) -> bool {
    let Some(filter) = filter else { return true };
    match crate::expr::evaluate(filter, row, registry) {
        Ok(v) => v.as_bool(),
        Err(e) => {
            log::warn!("WHERE evaluation failed, dropping row pre-window: {e}");
            stats.record_error("window");
            false
        }
    }
}

/// One running query: an input handle, the background tasks that drive it, and the shared
/// sink list and stats a caller can read from at any time.
pub struct Engine {
    input_tx: OverflowSender<Row>,
    sinks: Arc<AsyncMutex<Vec<Arc<dyn Sink>>>>,
    stats: Stats,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Builds and starts the pipeline for `plan`. Tasks begin running immediately; rows fed
    /// via `emit` flow through the window engine (if `plan.window` is set), the aggregator,
    /// and out to whatever sinks are registered by the time a batch finalizes.
    pub fn start(plan: QueryPlan, registry: FunctionRegistry, perf: PerformanceConfig) -> Result<Self> {
        let stats = Stats::new();
        let sinks: Arc<AsyncMutex<Vec<Arc<dyn Sink>>>> = Arc::new(AsyncMutex::new(Vec::new()));

        let (input_tx, input_rx) = overflow::bounded::<Row>(perf.input_overflow.clone())?;
        let (agg_tx, agg_rx) = overflow::bounded::<AggInput>(perf.to_agg_overflow.clone())?;
        let (sink_tx, sink_rx) = overflow::bounded::<Vec<Row>>(perf.to_sink_overflow.clone())?;

        let window_task =
            spawn_window_task(plan.clone(), registry.clone(), perf.clone(), input_rx, agg_tx.clone(), stats.clone());
        let agg_task = spawn_agg_task(plan, registry, agg_rx, sink_tx.clone(), stats.clone());
        let sink_task = spawn_sink_task(sinks.clone(), sink_rx, stats.clone());

        log::info!("pipeline started");
        Ok(Self { input_tx, sinks, stats, tasks: vec![window_task, agg_task, sink_task] })
    }

    /// Feeds one row into the pipeline. Counts toward `received` regardless of what
    /// happens to it downstream (spec.md §8 P5).
    pub async fn emit(&self, row: Row) -> Result<()> {
        self.stats.record_received("input");
        self.input_tx.send(row, &self.stats, "input").await.map(|_| ())
    }

    pub async fn add_sink(&self, sink: Arc<dyn Sink>) {
        self.sinks.lock().await.push(sink);
    }

    pub async fn add_sync_sink<F>(&self, f: F)
    where
        F: Fn(&[Row]) -> Result<()> + Send + Sync + 'static,
    {
        self.add_sink(Arc::new(SyncFnSink::new(f))).await;
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn per_stage_stats(&self) -> std::collections::HashMap<String, StatsSnapshot> {
        self.stats.per_stage_snapshot()
    }

    /// Closes the input, letting every in-flight row drain through the pipeline, then
    /// joins the background tasks.
    pub async fn stop(mut self) -> Result<StatsSnapshot> {
        self.input_tx.close();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        let snapshot = self.stats.snapshot();
        log::info!(
            "pipeline stopped: received={} sent={} dropped={} errors={}",
            snapshot.received,
            snapshot.sent,
            snapshot.dropped,
            snapshot.errors
        );
        Ok(snapshot)
    }
}

fn spawn_window_task(
    plan: QueryPlan,
    registry: FunctionRegistry,
    perf: PerformanceConfig,
    mut input_rx: overflow::Receiver<Row>,
    agg_tx: OverflowSender<AggInput>,
    stats: Stats,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let group_fields = plan.group_fields.clone();
        let mut strategy: Option<Box<dyn WindowStrategy>> =
            plan.window.as_ref().map(|spec| window::build(spec, group_fields));
        let mut ticker = tokio::time::interval(perf.worker.scheduler_tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                maybe_row = input_rx.recv() => {
                    match maybe_row {
                        Some(row) => {
                            if !passes_filter(&plan.filter, &row, &registry, &stats) {
                                continue;
                            }
                            match &mut strategy {
                                Some(w) => {
                                    for batch in w.add(row, &stats) {
                                        let _ = agg_tx.send(AggInput { slot: Some(batch.slot), rows: batch.rows }, &stats, "window").await;
                                    }
                                }
                                None => {
                                    let _ = agg_tx.send(AggInput { slot: None, rows: vec![row] }, &stats, "window").await;
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick(), if strategy.is_some() => {
                    if let Some(w) = &mut strategy {
                        for batch in w.tick(now_ms(), &stats) {
                            let _ = agg_tx.send(AggInput { slot: Some(batch.slot), rows: batch.rows }, &stats, "window").await;
                        }
                    }
                }
            }
        }

        if let Some(mut w) = strategy {
            for batch in w.close() {
                let _ = agg_tx.send(AggInput { slot: Some(batch.slot), rows: batch.rows }, &stats, "window").await;
            }
        }
        agg_tx.close();
    })
}

fn spawn_agg_task(
    plan: QueryPlan,
    registry: FunctionRegistry,
    mut agg_rx: overflow::Receiver<AggInput>,
    sink_tx: OverflowSender<Vec<Row>>,
    stats: Stats,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut engine = AggEngine::new(plan, registry);
        while let Some(input) = agg_rx.recv().await {
            match engine.finalize_batch(&input.rows, input.slot, &stats) {
                Ok(out) if !out.is_empty() => {
                    let _ = sink_tx.send(out, &stats, "agg").await;
                }
                Ok(_) => {}
                Err(_) => stats.record_error("agg"),
            }
        }
        sink_tx.close();
    })
}

fn spawn_sink_task(
    sinks: Arc<AsyncMutex<Vec<Arc<dyn Sink>>>>,
    mut sink_rx: overflow::Receiver<Vec<Row>>,
    stats: Stats,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(rows) = sink_rx.recv().await {
            let current: Vec<Arc<dyn Sink>> = sinks.lock().await.clone();
            for sink in &current {
                if let Err(e) = sink.write(&rows).await {
                    log::warn!("sink write failed: {e}");
                    stats.record_error("sink");
                }
            }
            for _ in &rows {
                stats.record_sent("sink");
            }
        }
    })
}
