//! Row, window slot, and group-key primitives (spec.md §3).

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::value::Value;

pub type Data = BTreeMap<String, Value>;

/// `(Timestamp, Data)`. `timestamp` defaults to ingest time but may be overridden by a
/// configured event-time field (§4.4 "Timestamp source").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub timestamp: i64,
    pub data: Data,
}

impl Row {
    pub fn new(data: Data) -> Self {
        Self { timestamp: now_millis(), data }
    }

    pub fn with_timestamp(timestamp: i64, data: Data) -> Self {
        Self { timestamp, data }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.data.insert(field.into(), value);
    }
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A half-open `[start, end)` interval identifying one window instance.
///
/// Equality is structural; the hash is derived from `(start, end)` in nanoseconds so a
/// slot can serve as part of a group sub-key (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowSlot {
    pub start: i64,
    pub end: i64,
}

impl WindowSlot {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Builds the stable group-key string for a row given the ordered `GroupFields`
/// (spec.md §3 "Group"). Uses a separator unlikely to collide with field values.
pub const GROUP_KEY_SEPARATOR: &str = "\u{1}";

pub fn group_key(row: &Row, group_fields: &[String]) -> String {
    if group_fields.is_empty() {
        return String::new();
    }
    let mut parts = Vec::with_capacity(group_fields.len());
    for field in group_fields {
        let v = row.data.get(field).cloned().unwrap_or(Value::Null);
        parts.push(v.to_string());
    }
    parts.join(GROUP_KEY_SEPARATOR)
}

/// The effective key combining the group tuple with the window slot (spec.md §3).
pub fn windowed_group_key(group_key: &str, slot: WindowSlot) -> String {
    format!("{group_key}{GROUP_KEY_SEPARATOR}{}{GROUP_KEY_SEPARATOR}{}", slot.start, slot.end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_stable_across_field_order() {
        let mut data = Data::new();
        data.insert("a".into(), Value::Str("x".into()));
        data.insert("b".into(), Value::Int(1));
        let row = Row::with_timestamp(0, data);
        let k1 = group_key(&row, &["a".into(), "b".into()]);
        let k2 = group_key(&row, &["a".into(), "b".into()]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn window_slot_half_open() {
        let slot = WindowSlot::new(0, 1000);
        assert!(slot.contains(0));
        assert!(!slot.contains(1000));
        assert!(slot.contains(999));
    }
}
