//! SQL sugar preprocessing (spec.md §4.2), applied to the raw expression string before it
//! reaches the Pratt parser. Order matters: backticks first (so later rewrites never see
//! a raw backtick), then `LIKE`, then `IS [NOT] NULL`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

pub struct Preprocessed {
    pub rewritten: String,
    /// Safe internal identifier -> original field name, for backtick-quoted idents.
    pub backtick_fields: HashMap<String, String>,
}

static BACKTICK: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z_][A-Za-z0-9_.]*)\s+LIKE\s+'((?:[^'\\]|\\.)*)'").unwrap()
});
static IS_NOT_NULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Za-z_][A-Za-z0-9_.\(\)]*)\s+IS\s+NOT\s+NULL").unwrap()
});
static IS_NULL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)([A-Za-z_][A-Za-z0-9_.\(\)]*)\s+IS\s+NULL").unwrap());

/// Rewrite `` `x y` `` into a safe internal identifier, recording the mapping back to the
/// original field name (spec.md §4.2 rule 1).
fn rewrite_backticks(expr: &str) -> (String, HashMap<String, String>) {
    let mut map = HashMap::new();
    let mut counter = 0usize;
    let rewritten = BACKTICK
        .replace_all(expr, |caps: &regex::Captures| {
            let original = caps[1].to_string();
            let safe = format!("__bt_{counter}");
            counter += 1;
            map.insert(safe.clone(), original);
            safe
        })
        .into_owned();
    (rewritten, map)
}

/// Rewrite `field LIKE 'pattern'` per spec.md §4.2 rule 2:
/// - `%p%` -> `contains(field, 'p')`
/// - `p%`  -> `starts_with(field, 'p')`
/// - `%p`  -> `ends_with(field, 'p')`
/// - pattern containing interior `%` or `_` -> `like_match(field, 'pattern')`
/// - empty pattern -> equality with empty string
/// - lone `%` -> always true
fn rewrite_like(expr: &str) -> String {
    LIKE.replace_all(expr, |caps: &regex::Captures| {
        let field = &caps[1];
        let pattern = caps[2].to_string();
        rewrite_one_like(field, &pattern)
    })
    .into_owned()
}

fn rewrite_one_like(field: &str, pattern: &str) -> String {
    if pattern.is_empty() {
        return format!("{field} = ''");
    }
    if pattern == "%" {
        return "true".to_string();
    }
    let starts_pct = pattern.starts_with('%');
    let ends_pct = pattern.ends_with('%');
    let inner = &pattern[if starts_pct { 1 } else { 0 }..pattern.len() - if ends_pct { 1 } else { 0 }];
    let has_extra_wildcard = inner.contains('%') || inner.contains('_') || pattern.matches('%').count() > 2;
    if has_extra_wildcard {
        return format!("like_match({field}, '{pattern}')");
    }
    match (starts_pct, ends_pct) {
        (true, true) => format!("contains({field}, '{inner}')"),
        (false, true) => format!("starts_with({field}, '{inner}')"),
        (true, false) => format!("ends_with({field}, '{inner}')"),
        (false, false) => format!("{field} = '{pattern}'"),
    }
}

/// Rewrite `expr IS [NOT] NULL` into calls to `is_null`/`is_not_null` (spec.md §4.2 rule
/// 3). `IS NOT NULL` must be matched before `IS NULL` or the latter's regex would also
/// fire on the `NULL` suffix of the former.
fn rewrite_is_null(expr: &str) -> String {
    let step1 = IS_NOT_NULL.replace_all(expr, "is_not_null($1)").into_owned();
    IS_NULL.replace_all(&step1, "is_null($1)").into_owned()
}

pub fn preprocess(expr: &str) -> Preprocessed {
    let (after_backticks, backtick_fields) = rewrite_backticks(expr);
    let after_like = rewrite_like(&after_backticks);
    let after_is_null = rewrite_is_null(&after_like);
    Preprocessed { rewritten: after_is_null, backtick_fields }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_percent_both_sides_is_contains() {
        let out = rewrite_like("name LIKE '%john%'");
        assert_eq!(out, "contains(name, 'john')");
    }

    #[test]
    fn like_trailing_percent_is_starts_with() {
        let out = rewrite_like("name LIKE 'jo%'");
        assert_eq!(out, "starts_with(name, 'jo')");
    }

    #[test]
    fn like_leading_percent_is_ends_with() {
        let out = rewrite_like("name LIKE '%nny'");
        assert_eq!(out, "ends_with(name, 'nny')");
    }

    #[test]
    fn like_lone_percent_is_always_true() {
        let out = rewrite_like("name LIKE '%'");
        assert_eq!(out, "true");
    }

    #[test]
    fn like_empty_pattern_is_equality() {
        let out = rewrite_like("name LIKE ''");
        assert_eq!(out, "name = ''");
    }

    #[test]
    fn like_interior_underscore_falls_back_to_like_match() {
        let out = rewrite_like("name LIKE 'j_hn'");
        assert_eq!(out, "like_match(name, 'j_hn')");
    }

    #[test]
    fn is_not_null_rewritten_before_is_null() {
        let out = rewrite_is_null("f(x) IS NOT NULL");
        assert_eq!(out, "is_not_null(f(x))");
    }

    #[test]
    fn is_null_rewritten() {
        let out = rewrite_is_null("x IS NULL");
        assert_eq!(out, "is_null(x)");
    }

    #[test]
    fn backticks_map_back_to_original_field() {
        let pre = preprocess("`field with spaces` > 1");
        assert_eq!(pre.backtick_fields.len(), 1);
        let safe = pre.backtick_fields.keys().next().unwrap();
        assert_eq!(pre.backtick_fields[safe], "field with spaces");
        assert!(pre.rewritten.contains(safe));
    }
}
