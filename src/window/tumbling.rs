//! Fixed-size, non-overlapping windows aligned to epoch boundaries (spec.md §4.4).

use std::collections::HashMap;

use crate::row::{Row, WindowSlot};
use crate::runtime::stats::Stats;

use super::{event_time, group_key_of, WindowBatch, WindowStrategy};

struct GroupState {
    slot: WindowSlot,
    rows: Vec<Row>,
    watermark: i64,
}

pub struct TumblingWindow {
    size_ms: i64,
    lateness_ms: i64,
    ts_field: Option<String>,
    group_fields: Vec<String>,
    groups: HashMap<String, GroupState>,
}

impl TumblingWindow {
    pub fn new(size_ms: i64, lateness_ms: i64, ts_field: Option<String>, group_fields: Vec<String>) -> Self {
        Self { size_ms, lateness_ms, ts_field, group_fields, groups: HashMap::new() }
    }

    fn slot_for(&self, ts: i64) -> WindowSlot {
        let start = (ts / self.size_ms) * self.size_ms;
        WindowSlot::new(start, start + self.size_ms)
    }
}

impl WindowStrategy for TumblingWindow {
    fn add(&mut self, row: Row, stats: &Stats) -> Vec<WindowBatch> {
        let ts = event_time(&row, &self.ts_field);
        let slot = self.slot_for(ts);
        let key = group_key_of(&row, &self.group_fields);
        let mut out = Vec::new();

        match self.groups.get_mut(&key) {
            None => {
                log::info!("tumbling window opened for group '{key}': {:?}", slot);
                self.groups.insert(key, GroupState { slot, rows: vec![row], watermark: slot.start });
            }
            Some(state) => {
                if slot == state.slot {
                    state.rows.push(row);
                } else if slot.start > state.slot.start {
                    log::info!("tumbling window triggered for group '{key}': {:?}", state.slot);
                    let finished = std::mem::replace(&mut state.rows, vec![row]);
                    out.push(WindowBatch { slot: state.slot, rows: finished });
                    state.watermark = state.slot.end;
                    state.slot = slot;
                } else if state.watermark - ts <= self.lateness_ms {
                    // Within allowed lateness of a slot that already rolled over: folded
                    // into the *current* slot rather than reopening a closed one.
                    state.rows.push(row);
                } else {
                    log::warn!("dropping late row for group '{key}' (ts={ts}, watermark={})", state.watermark);
                    stats.record_dropped("window");
                }
            }
        }
        out
    }

    fn tick(&mut self, now_ms: i64, _stats: &Stats) -> Vec<WindowBatch> {
        let mut out = Vec::new();
        let mut done_keys = Vec::new();
        for (key, state) in self.groups.iter_mut() {
            if state.slot.end <= now_ms && !state.rows.is_empty() {
                log::info!("tumbling window triggered by tick for group '{key}': {:?}", state.slot);
                out.push(WindowBatch { slot: state.slot, rows: std::mem::take(&mut state.rows) });
                done_keys.push(key.clone());
            }
        }
        for key in done_keys {
            if let Some(state) = self.groups.get_mut(&key) {
                state.watermark = state.slot.end;
                state.slot = WindowSlot::new(state.slot.end, state.slot.end + self.size_ms);
            }
        }
        out
    }

    fn close(&mut self) -> Vec<WindowBatch> {
        self.groups
            .drain()
            .filter(|(_, s)| !s.rows.is_empty())
            .map(|(_, mut s)| WindowBatch { slot: s.slot, rows: std::mem::take(&mut s.rows) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Data;
    use crate::value::Value;

    fn row(device: &str, v: i64, ts: i64) -> Row {
        let mut data = Data::new();
        data.insert("deviceId".into(), Value::Str(device.into()));
        data.insert("v".into(), Value::Int(v));
        Row::with_timestamp(ts, data)
    }

    #[test]
    fn rolls_over_on_next_slot_row() {
        let mut w = TumblingWindow::new(1000, 0, None, vec!["deviceId".into()]);
        let stats = Stats::new();
        assert!(w.add(row("a", 1, 0), &stats).is_empty());
        assert!(w.add(row("a", 2, 500), &stats).is_empty());
        let batches = w.add(row("a", 3, 1200), &stats);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 2);
        assert_eq!(batches[0].slot, WindowSlot::new(0, 1000));
    }

    #[test]
    fn tick_flushes_without_a_new_row() {
        let mut w = TumblingWindow::new(1000, 0, None, vec![]);
        let stats = Stats::new();
        w.add(row("a", 1, 0), &stats);
        assert!(w.tick(500, &stats).is_empty());
        let batches = w.tick(1000, &stats);
        assert_eq!(batches.len(), 1);
    }
}
