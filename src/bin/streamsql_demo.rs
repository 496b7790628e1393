//! Small runnable demo: plans a tumbling-window query, starts the engine, feeds a handful
//! of synthetic rows, and prints whatever the window emits to stdout.

use std::sync::Arc;
use std::time::Duration;

use streamsql::row::{Data, Row};
use streamsql::runtime::Sink;
use streamsql::value::Value;
use streamsql::{Engine, FunctionRegistry, PerformanceConfig, Planner, Result, SqlPlanner};

struct StdoutSink;

#[async_trait::async_trait]
impl Sink for StdoutSink {
    async fn write(&self, rows: &[Row]) -> Result<()> {
        for row in rows {
            println!("{:?}", row.data);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    streamsql::init_logging();

    let registry = FunctionRegistry::with_builtins();
    let planner = SqlPlanner::new(registry.clone());
    let plan = planner.plan("SELECT deviceId, sum(v) AS total FROM readings GROUP BY deviceId, TumblingWindow('1s')")?;

    let engine = Engine::start(plan, registry, PerformanceConfig::default())?;
    engine.add_sink(Arc::new(StdoutSink)).await;

    for (device, v) in [("sensor-1", 3), ("sensor-2", 7), ("sensor-1", 4)] {
        let mut data = Data::new();
        data.insert("deviceId".into(), Value::Str(device.into()));
        data.insert("v".into(), Value::Int(v));
        engine.emit(Row::new(data)).await?;
    }

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let stats = engine.stop().await?;
    println!("received={} sent={} dropped={} errors={}", stats.received, stats.sent, stats.dropped, stats.errors);
    Ok(())
}
