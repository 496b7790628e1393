//! End-to-end pipeline tests: plan a query with `SqlPlanner`, run it through a live
//! `Engine`, and check what comes out the sink side.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use streamsql::row::{Data, Row};
use streamsql::runtime::Sink;
use streamsql::value::Value;
use streamsql::{Engine, FunctionRegistry, PerformanceConfig, Planner, Result, SqlPlanner};

struct CollectingSink {
    rows: Arc<Mutex<Vec<Row>>>,
}

#[async_trait::async_trait]
impl Sink for CollectingSink {
    async fn write(&self, rows: &[Row]) -> Result<()> {
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}

struct SlowSink {
    delay: Duration,
}

#[async_trait::async_trait]
impl Sink for SlowSink {
    async fn write(&self, _rows: &[Row]) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

fn device_row(device: &str, v: i64) -> Row {
    let mut data = Data::new();
    data.insert("deviceId".into(), Value::Str(device.into()));
    data.insert("v".into(), Value::Int(v));
    Row::new(data)
}

fn timed_row(v: i64, ts: i64) -> Row {
    let mut data = Data::new();
    data.insert("v".into(), Value::Int(v));
    Row::with_timestamp(ts, data)
}

#[tokio::test]
async fn tumbling_sum_produces_per_group_totals() {
    let registry = FunctionRegistry::with_builtins();
    let planner = SqlPlanner::new(registry.clone());
    let plan = planner
        .plan("SELECT deviceId, sum(v) AS total FROM readings GROUP BY deviceId, TumblingWindow('1s')")
        .unwrap();

    let mut perf = PerformanceConfig::default();
    perf.worker.scheduler_tick = Duration::from_millis(50);

    let engine = Engine::start(plan, registry, perf).unwrap();
    let collected = Arc::new(Mutex::new(Vec::new()));
    engine.add_sink(Arc::new(CollectingSink { rows: collected.clone() })).await;

    engine.emit(device_row("a", 1)).await.unwrap();
    engine.emit(device_row("b", 10)).await.unwrap();
    engine.emit(device_row("a", 2)).await.unwrap();

    // Let the scheduler tick past the 1s tumbling boundary so the window flushes even
    // though no further row rolls it over.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let stats = engine.stop().await.unwrap();

    assert_eq!(stats.received, 3);

    let rows = collected.lock().unwrap();
    let mut totals: std::collections::BTreeMap<String, i64> = std::collections::BTreeMap::new();
    for row in rows.iter() {
        let device = row.data.get("deviceId").unwrap().as_str().unwrap().to_string();
        let total = row.data.get("total").unwrap().as_i64().unwrap();
        totals.insert(device, total);
    }
    assert_eq!(totals.get("a"), Some(&3));
    assert_eq!(totals.get("b"), Some(&10));
}

#[tokio::test]
async fn block_overflow_under_sustained_backpressure_never_loses_the_accounting() {
    // A counting window of 1 with a tiny, Block-policy output buffer and a sink much
    // slower than the block timeout: some sends succeed, most time out and are counted as
    // dropped, but every row is accounted for one way or the other (spec.md §8 P5).
    let registry = FunctionRegistry::with_builtins();
    let planner = SqlPlanner::new(registry.clone());
    let plan = planner.plan("SELECT count(v) AS c FROM readings GROUP BY CountingWindow(1)").unwrap();

    let mut perf = PerformanceConfig::default();
    perf.buffers.agg_to_sink_capacity = 1;
    perf.to_sink_overflow.capacity = 1;
    perf.to_sink_overflow.strategy = streamsql::overflow::OverflowStrategy::Block;
    perf.to_sink_overflow.block_timeout = Duration::from_millis(100);

    let engine = Engine::start(plan, registry, perf).unwrap();
    engine.add_sink(Arc::new(SlowSink { delay: Duration::from_millis(500) })).await;

    for v in 0..5i64 {
        engine.emit(device_row("only", v)).await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(700)).await;
    let stats = engine.stop().await.unwrap();

    assert_eq!(stats.received, 5);
    assert_eq!(stats.sent + stats.dropped, 5);
    assert!(stats.dropped >= 1, "a 500ms sink behind a 100ms block timeout must drop something");
}

#[tokio::test]
async fn like_and_is_null_filter_rows_end_to_end() {
    let registry = FunctionRegistry::with_builtins();
    let planner = SqlPlanner::new(registry.clone());
    let plan = planner
        .plan("SELECT deviceId FROM readings WHERE deviceId LIKE '%sensor%' AND v IS NOT NULL GROUP BY CountingWindow(1)")
        .unwrap();

    let engine = Engine::start(plan, registry, PerformanceConfig::default()).unwrap();
    let collected = Arc::new(Mutex::new(Vec::new()));
    engine.add_sink(Arc::new(CollectingSink { rows: collected.clone() })).await;

    engine.emit(device_row("sensor-1", 1)).await.unwrap();
    engine.emit(device_row("gateway-9", 2)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop().await.unwrap();

    let rows = collected.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].data.get("deviceId").unwrap().as_str().unwrap(), "sensor-1");
}

#[tokio::test]
async fn where_is_applied_before_the_row_reaches_the_window() {
    // A row that fails WHERE must never reach the tumbling window, or its timestamp could
    // still roll the window's slot/watermark forward. Here the filtered-out row (v = -3)
    // carries a timestamp a full slot ahead of the two rows that pass; if WHERE ran after
    // windowing (inside the aggregator) instead of before it, this row would still reach
    // the window, roll its slot from [0,1000) to [1000,2000), and strand the third row
    // (ts = 200, same slot as the first) behind the resulting watermark, where it gets
    // dropped as late before HAVING/WHERE ever had a chance to discard the -3 row's effect.
    let registry = FunctionRegistry::with_builtins();
    let planner = SqlPlanner::new(registry.clone());
    let plan = planner
        .plan("SELECT sum(v) AS total FROM readings WHERE v > 0 GROUP BY TumblingWindow('1s')")
        .unwrap();

    let engine = Engine::start(plan, registry, PerformanceConfig::default()).unwrap();
    let collected = Arc::new(Mutex::new(Vec::new()));
    engine.add_sink(Arc::new(CollectingSink { rows: collected.clone() })).await;

    engine.emit(timed_row(5, 100)).await.unwrap();
    engine.emit(timed_row(-3, 1500)).await.unwrap();
    engine.emit(timed_row(7, 200)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = engine.stop().await.unwrap();

    assert_eq!(stats.received, 3);
    let rows = collected.lock().unwrap();
    assert_eq!(rows.len(), 1, "the two rows that pass WHERE belong to one un-rolled window");
    assert_eq!(rows[0].data.get("total").unwrap().as_i64().unwrap(), 12);
}
