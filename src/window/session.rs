//! Dynamically-sized windows that close after `gap` of inactivity per group (spec.md
//! §4.4). Unlike tumbling/sliding, a session's end time isn't known until it closes.

use std::collections::HashMap;

use crate::row::{Row, WindowSlot};
use crate::runtime::stats::Stats;

use super::{event_time, group_key_of, WindowBatch, WindowStrategy};

struct Session {
    start: i64,
    last_seen: i64,
    rows: Vec<Row>,
}

pub struct SessionWindow {
    gap_ms: i64,
    ts_field: Option<String>,
    group_fields: Vec<String>,
    groups: HashMap<String, Session>,
}

impl SessionWindow {
    pub fn new(gap_ms: i64, ts_field: Option<String>, group_fields: Vec<String>) -> Self {
        Self { gap_ms, ts_field, group_fields, groups: HashMap::new() }
    }
}

impl WindowStrategy for SessionWindow {
    fn add(&mut self, row: Row, _stats: &Stats) -> Vec<WindowBatch> {
        let ts = event_time(&row, &self.ts_field);
        let key = group_key_of(&row, &self.group_fields);
        let mut out = Vec::new();

        match self.groups.get_mut(&key) {
            None => {
                self.groups.insert(key, Session { start: ts, last_seen: ts, rows: vec![row] });
            }
            Some(session) => {
                if ts - session.last_seen <= self.gap_ms {
                    session.last_seen = session.last_seen.max(ts);
                    session.rows.push(row);
                } else {
                    log::info!("session window closed for group '{key}' by gap (last_seen={})", session.last_seen);
                    let finished = Session {
                        start: session.start,
                        last_seen: session.last_seen,
                        rows: std::mem::replace(&mut session.rows, vec![row]),
                    };
                    out.push(WindowBatch { slot: WindowSlot::new(finished.start, finished.last_seen), rows: finished.rows });
                    session.start = ts;
                    session.last_seen = ts;
                }
            }
        }
        out
    }

    fn tick(&mut self, now_ms: i64, _stats: &Stats) -> Vec<WindowBatch> {
        let mut out = Vec::new();
        let mut done = Vec::new();
        for (key, session) in self.groups.iter() {
            if now_ms - session.last_seen > self.gap_ms {
                done.push(key.clone());
            }
        }
        for key in done {
            if let Some(session) = self.groups.remove(&key) {
                out.push(WindowBatch { slot: WindowSlot::new(session.start, session.last_seen), rows: session.rows });
            }
        }
        out
    }

    fn close(&mut self) -> Vec<WindowBatch> {
        self.groups
            .drain()
            .map(|(_, s)| WindowBatch { slot: WindowSlot::new(s.start, s.last_seen), rows: s.rows })
            .collect()
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
    fn gap_closes_the_session() {
        let mut w = SessionWindow::new(500, None, vec![]);
        let stats = Stats::new();
        assert!(w.add(row(1, 0), &stats).is_empty());
        assert!(w.add(row(2, 200), &stats).is_empty());
        let batches = w.add(row(3, 900), &stats);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows.len(), 2);
    }

    #[test]
    fn tick_closes_idle_session() {
        let mut w = SessionWindow::new(500, None, vec![]);
        let stats = Stats::new();
        w.add(row(1, 0), &stats);
        assert!(w.tick(400, &stats).is_empty());
        let batches = w.tick(600, &stats);
        assert_eq!(batches.len(), 1);
    }
}
