//! Starter scalar function catalogue (SPEC_FULL.md §E). Out of the core's documented
//! scope (spec.md §1 calls the "concrete scalar function catalogue" an external
//! collaborator), but a runnable engine needs *some* functions registered by default.
//! Kept intentionally small: string, date, array, and a couple of JSON/crypto helpers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StreamSqlError;
use crate::registry::{Descriptor, FunctionRegistry, Payload, Role};
use crate::value::Value;

fn desc(name: &str, aliases: &[&str], min: usize, max: i64, category: &str, desc_text: &str, f: crate::registry::ScalarFn) -> Descriptor {
    Descriptor {
        name: name.to_string(),
        aliases: aliases.iter().map(|s| s.to_string()).collect(),
        role: Role::Scalar,
        min_args: min,
        max_args: max,
        category: category.to_string(),
        description: desc_text.to_string(),
        payload: Payload::Scalar(f),
    }
}

pub fn register_builtins(reg: &FunctionRegistry) {
    let _ = reg.register(desc(
        "upper",
        &[],
        1,
        1,
        "string",
        "Uppercase a string",
        Arc::new(|args| Ok(Value::Str(args[0].as_str().unwrap_or_default().to_uppercase()))),
    ));
    let _ = reg.register(desc(
        "lower",
        &[],
        1,
        1,
        "string",
        "Lowercase a string",
        Arc::new(|args| Ok(Value::Str(args[0].as_str().unwrap_or_default().to_lowercase()))),
    ));
    let _ = reg.register(desc(
        "concat",
        &["CONCAT"],
        1,
        -1,
        "string",
        "Concatenate all arguments as strings",
        Arc::new(|args| Ok(Value::Str(args.iter().map(|v| v.to_string()).collect::<String>()))),
    ));
    let _ = reg.register(desc(
        "length",
        &["len"],
        1,
        1,
        "string",
        "Length of a string or list",
        Arc::new(|args| match &args[0] {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(l) => Ok(Value::Int(l.len() as i64)),
            other => Err(StreamSqlError::type_mismatch(format!("length() on {other}"))),
        }),
    ));
    let _ = reg.register(desc(
        "like_match",
        &[],
        2,
        2,
        "string",
        "SQL LIKE pattern match with % and _ wildcards",
        Arc::new(|args| {
            let s = args[0].as_str().unwrap_or_default();
            let pat = args[1].as_str().unwrap_or_default();
            Ok(Value::Bool(like_match(s, pat)))
        }),
    ));
    let _ = reg.register(desc(
        "is_null",
        &[],
        1,
        1,
        "logic",
        "True if the argument is null",
        Arc::new(|args| Ok(Value::Bool(args[0].is_null()))),
    ));
    let _ = reg.register(desc(
        "is_not_null",
        &[],
        1,
        1,
        "logic",
        "True if the argument is not null",
        Arc::new(|args| Ok(Value::Bool(!args[0].is_null()))),
    ));
    let _ = reg.register(desc(
        "array_contains",
        &[],
        2,
        2,
        "array",
        "True if the list contains the value",
        Arc::new(|args| {
            let list = args[0].as_list().unwrap_or(&[]);
            Ok(Value::Bool(list.iter().any(|v| v.equals(&args[1]))))
        }),
    ));
    let _ = reg.register(desc(
        "array_length",
        &[],
        1,
        1,
        "array",
        "Length of a list",
        Arc::new(|args| Ok(Value::Int(args[0].as_list().map(|l| l.len()).unwrap_or(0) as i64))),
    ));
    let _ = reg.register(desc(
        "now",
        &[],
        0,
        0,
        "date",
        "Current Unix timestamp in milliseconds",
        Arc::new(|_args| Ok(Value::Int(crate::row::now_millis()))),
    ));
    let _ = reg.register(desc(
        "to_unix_millis",
        &["parse_time"],
        1,
        1,
        "date",
        "Parse an RFC3339 timestamp string to Unix milliseconds",
        Arc::new(|args| {
            let s = args[0]
                .as_str()
                .ok_or_else(|| StreamSqlError::type_mismatch("to_unix_millis() expects a string"))?;
            let dt: DateTime<Utc> = s
                .parse()
                .map_err(|e| StreamSqlError::type_mismatch(format!("invalid timestamp '{s}': {e}")))?;
            Ok(Value::Int(dt.timestamp_millis()))
        }),
    ));
    let _ = reg.register(desc(
        "json_extract",
        &[],
        2,
        2,
        "json",
        "Extract a field from a nested mapping value by dotted path",
        Arc::new(|args| {
            let mut cur = args[0].clone();
            let path = args[1].as_str().unwrap_or_default();
            for segment in path.split('.').filter(|s| !s.is_empty()) {
                cur = match cur {
                    Value::Map(ref m) => m.get(segment).cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                };
            }
            Ok(cur)
        }),
    ));
    let _ = reg.register(desc(
        "hash64",
        &[],
        1,
        1,
        "crypto",
        "Non-cryptographic 64-bit hash of a value's string form, for sampling/partitioning",
        Arc::new(|args| {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            args[0].to_string().hash(&mut hasher);
            Ok(Value::Int(hasher.finish() as i64))
        }),
    ));
}

/// Glob-style LIKE matcher supporting `%` (any run) and `_` (single char), used as the
/// fallback path for patterns `like_match` can't rewrite into `contains`/`starts_with`/
/// `ends_with` (spec.md §4.2 rule 2).
pub fn like_match(s: &str, pattern: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    like_match_rec(&s, &p)
}

fn like_match_rec(s: &[char], p: &[char]) -> bool {
    match p.first() {
        None => s.is_empty(),
        Some('%') => like_match_rec(s, &p[1..]) || (!s.is_empty() && like_match_rec(&s[1..], p)),
        Some('_') => !s.is_empty() && like_match_rec(&s[1..], &p[1..]),
        Some(c) => !s.is_empty() && s[0] == *c && like_match_rec(&s[1..], &p[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_match_wildcards() {
        assert!(like_match("johnny", "%john%"));
        assert!(!like_match("mary", "%john%"));
        assert!(like_match("anything", "%"));
        assert!(like_match("ab", "a_"));
        assert!(!like_match("abc", "a_"));
    }
}
