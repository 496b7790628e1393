//! Pipeline performance configuration, loaded from environment variables with sensible
//! defaults (spec.md §4.6, §9 "Configuration"). Three independent overflow policies cover
//! the three bounded hand-offs the runtime wires together: raw ingest, window-to-aggregator,
//! and aggregator-to-sink.

use std::env;
use std::time::Duration;

use crate::overflow::{OverflowConfig, OverflowStrategy};

#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub input_capacity: usize,
    pub window_to_agg_capacity: usize,
    pub agg_to_sink_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { input_capacity: 10_000, window_to_agg_capacity: 1_000, agg_to_sink_capacity: 1_000 }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the scheduler wakes the window engine for its time-driven trigger check
    /// (spec.md §4.4), independent of row arrival.
    pub scheduler_tick: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { scheduler_tick: Duration::from_millis(100) }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub buffers: BufferConfig,
    pub input_overflow: OverflowConfig,
    pub to_agg_overflow: OverflowConfig,
    pub to_sink_overflow: OverflowConfig,
    pub worker: WorkerConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        let buffers = BufferConfig::default();
        Self {
            input_overflow: OverflowConfig { capacity: buffers.input_capacity, ..Default::default() },
            to_agg_overflow: OverflowConfig { capacity: buffers.window_to_agg_capacity, ..Default::default() },
            to_sink_overflow: OverflowConfig {
                capacity: buffers.agg_to_sink_capacity,
                strategy: OverflowStrategy::Drop,
                ..Default::default()
            },
            buffers,
            worker: WorkerConfig::default(),
        }
    }
}

impl PerformanceConfig {
    /// Loads configuration from environment variables, falling back to `.env` if present
    /// (mirrors `dotenv::dotenv().ok()` at the top of `main`, same as the rest of this
    /// crate's binaries).
    ///
    /// Environment variables:
    /// - `STREAMSQL_INPUT_BUFFER` (default: 10000)
    /// - `STREAMSQL_WINDOW_TO_AGG_BUFFER` (default: 1000)
    /// - `STREAMSQL_AGG_TO_SINK_BUFFER` (default: 1000)
    /// - `STREAMSQL_SINK_OVERFLOW_STRATEGY` (default: drop; one of block/drop/drop_newest/expand/persist_spill)
    /// - `STREAMSQL_SINK_BLOCK_TIMEOUT_MS` (default: 100)
    /// - `STREAMSQL_SCHEDULER_TICK_MS` (default: 100)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut cfg = Self::default();

        cfg.buffers.input_capacity =
            env_usize("STREAMSQL_INPUT_BUFFER").unwrap_or(cfg.buffers.input_capacity);
        cfg.buffers.window_to_agg_capacity =
            env_usize("STREAMSQL_WINDOW_TO_AGG_BUFFER").unwrap_or(cfg.buffers.window_to_agg_capacity);
        cfg.buffers.agg_to_sink_capacity =
            env_usize("STREAMSQL_AGG_TO_SINK_BUFFER").unwrap_or(cfg.buffers.agg_to_sink_capacity);

        cfg.input_overflow.capacity = cfg.buffers.input_capacity;
        cfg.to_agg_overflow.capacity = cfg.buffers.window_to_agg_capacity;
        cfg.to_sink_overflow.capacity = cfg.buffers.agg_to_sink_capacity;

        if let Ok(s) = env::var("STREAMSQL_SINK_OVERFLOW_STRATEGY") {
            if let Some(strategy) = parse_strategy(&s) {
                cfg.to_sink_overflow.strategy = strategy;
            }
        }
        if let Some(ms) = env_usize("STREAMSQL_SINK_BLOCK_TIMEOUT_MS") {
            cfg.to_sink_overflow.block_timeout = Duration::from_millis(ms as u64);
        }
        if let Some(ms) = env_usize("STREAMSQL_SCHEDULER_TICK_MS") {
            cfg.worker.scheduler_tick = Duration::from_millis(ms as u64);
        }

        cfg
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn parse_strategy(s: &str) -> Option<OverflowStrategy> {
    match s.to_lowercase().as_str() {
        "block" => Some(OverflowStrategy::Block),
        "drop" => Some(OverflowStrategy::Drop),
        "drop_newest" | "dropnewest" => Some(OverflowStrategy::DropNewest),
        "expand" => Some(OverflowStrategy::Expand),
        "persist_spill" | "persistspill" => Some(OverflowStrategy::PersistSpill),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_has_sensible_buffer_sizes() {
        let cfg = PerformanceConfig::default();
        assert_eq!(cfg.buffers.input_capacity, 10_000);
        assert_eq!(cfg.to_sink_overflow.strategy, OverflowStrategy::Drop);
    }

    #[test]
    fn from_env_picks_up_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("STREAMSQL_INPUT_BUFFER", "5000");
        env::set_var("STREAMSQL_SINK_OVERFLOW_STRATEGY", "block");
        env::set_var("STREAMSQL_SINK_BLOCK_TIMEOUT_MS", "250");

        let cfg = PerformanceConfig::from_env();

        assert_eq!(cfg.buffers.input_capacity, 5_000);
        assert_eq!(cfg.to_sink_overflow.strategy, OverflowStrategy::Block);
        assert_eq!(cfg.to_sink_overflow.block_timeout, Duration::from_millis(250));

        env::remove_var("STREAMSQL_INPUT_BUFFER");
        env::remove_var("STREAMSQL_SINK_OVERFLOW_STRATEGY");
        env::remove_var("STREAMSQL_SINK_BLOCK_TIMEOUT_MS");
    }
}
