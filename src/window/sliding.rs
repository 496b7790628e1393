//! Overlapping fixed-size windows re-triggered every `slide` (spec.md §4.4). A row can
//! belong to several simultaneously open slots (`size / slide` of them, in the typical
//! case where `size` is a multiple of `slide`).

use std::collections::HashMap;

use crate::row::{Row, WindowSlot};
use crate::runtime::stats::Stats;

use super::{event_time, group_key_of, WindowBatch, WindowStrategy};

pub struct SlidingWindow {
    size_ms: i64,
    slide_ms: i64,
    ts_field: Option<String>,
    group_fields: Vec<String>,
    /// group key -> open slot -> accumulated rows
    groups: HashMap<String, HashMap<WindowSlot, Vec<Row>>>,
}

impl SlidingWindow {
    pub fn new(size_ms: i64, slide_ms: i64, ts_field: Option<String>, group_fields: Vec<String>) -> Self {
        Self { size_ms, slide_ms, ts_field, group_fields, groups: HashMap::new() }
    }

    fn slots_for(&self, ts: i64) -> Vec<WindowSlot> {
        let mut slots = Vec::new();
        let base = (ts / self.slide_ms) * self.slide_ms;
        let candidates = (self.size_ms / self.slide_ms) + 1;
        for k in 0..candidates {
            let start = base - k * self.slide_ms;
            if start <= ts && ts < start + self.size_ms {
                slots.push(WindowSlot::new(start, start + self.size_ms));
            }
        }
        slots
    }
}

impl WindowStrategy for SlidingWindow {
    fn add(&mut self, row: Row, _stats: &Stats) -> Vec<WindowBatch> {
        let ts = event_time(&row, &self.ts_field);
        let key = group_key_of(&row, &self.group_fields);
        let slots = self.slots_for(ts);
        let entry = self.groups.entry(key).or_default();
        for slot in slots {
            entry.entry(slot).or_default().push(row.clone());
        }
        Vec::new()
    }

    fn tick(&mut self, now_ms: i64, _stats: &Stats) -> Vec<WindowBatch> {
        let mut out = Vec::new();
        for group in self.groups.values_mut() {
            let due: Vec<WindowSlot> = group.keys().filter(|s| s.end <= now_ms).copied().collect();
            for slot in due {
                if let Some(rows) = group.remove(&slot) {
                    log::info!("sliding window triggered: {:?}", slot);
                    out.push(WindowBatch { slot, rows });
                }
            }
        }
        out
    }

    fn close(&mut self) -> Vec<WindowBatch> {
        let mut out = Vec::new();
        for (_, mut group) in self.groups.drain() {
            for (slot, rows) in group.drain() {
                out.push(WindowBatch { slot, rows });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Data;
    use crate::value::Value;

    fn row(v: i64, ts: i64) -> Row {
        let mut data = Data::new();
        data.insert("v".into(), Value::Int(v));
        Row::with_timestamp(ts, data)
    }

    #[test]
    fn row_lands_in_every_overlapping_slot() {
        let mut w = SlidingWindow::new(1000, 200, None, vec![]);
        let stats = Stats::new();
        w.add(row(1, 950), &stats);
        // 1000ms window sliding every 200ms: ts=950 should belong to slots
        // [0,1000), [200,1200), [400,1400), [600,1600), [800,1800).
        let total_slots: usize = w.groups.values().map(|g| g.len()).sum();
        assert_eq!(total_slots, 5);
    }

    #[test]
    fn tick_flushes_only_expired_slots() {
        let mut w = SlidingWindow::new(1000, 500, None, vec![]);
        let stats = Stats::new();
        w.add(row(1, 100), &stats);
        assert!(w.tick(900, &stats).is_empty());
        let batches = w.tick(1000, &stats);
        assert!(!batches.is_empty());
    }
}
