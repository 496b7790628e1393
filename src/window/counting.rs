//! Count-based windows: trigger per group once `count` rows have accumulated, independent
//! of wall-clock time (spec.md §4.4). `tick` is a no-op; there is nothing time-driven here.

use std::collections::HashMap;

use crate::row::{Row, WindowSlot};
use crate::runtime::stats::Stats;

use super::{group_key_of, WindowBatch, WindowStrategy};

pub struct CountingWindow {
    count: u64,
    group_fields: Vec<String>,
    groups: HashMap<String, Vec<Row>>,
}

impl CountingWindow {
    pub fn new(count: u64, group_fields: Vec<String>) -> Self {
        Self { count: count.max(1), group_fields, groups: HashMap::new() }
    }
}

impl WindowStrategy for CountingWindow {
    fn add(&mut self, row: Row, _stats: &Stats) -> Vec<WindowBatch> {
        let key = group_key_of(&row, &self.group_fields);
        let ts = row.timestamp;
        let buf = self.groups.entry(key).or_default();
        buf.push(row);
        if buf.len() as u64 >= self.count {
            log::info!("counting window triggered ({} rows reached)", self.count);
            let rows = std::mem::take(buf);
            let start = rows.first().map(|r| r.timestamp).unwrap_or(ts);
            let end = rows.last().map(|r| r.timestamp).unwrap_or(ts);
            vec![WindowBatch { slot: WindowSlot::new(start, end.max(start + 1)), rows }]
        } else {
            Vec::new()
        }
    }

    fn tick(&mut self, _now_ms: i64, _stats: &Stats) -> Vec<WindowBatch> {
        Vec::new()
    }

    fn close(&mut self) -> Vec<WindowBatch> {
        self.groups
            .drain()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(_, rows)| {
                let start = rows.first().map(|r| r.timestamp).unwrap_or(0);
                let end = rows.last().map(|r| r.timestamp).unwrap_or(0);
                WindowBatch { slot: WindowSlot::new(start, end.max(start + 1)), rows }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Data;
    use crate::value::Value;

    fn row(v: i64) -> Row {
        let mut data = Data::new();
        data.insert("v".into(), Value::Int(v));
        Row::new(data)
    }

    #[test]
    fn triggers_once_count_is_reached() {
        let mut w = CountingWindow::new(3, vec![]);
        let stats = Stats::new();
        assert!(w.add(row(1), &stats).is_empty());
        assert!(w.add(row(2), &stats).is_empty());
        let batches = w.add(row(3), &stats);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 3);
        // counter resets after a trigger
        assert!(w.add(row(4), &stats).is_empty());
    }
}
