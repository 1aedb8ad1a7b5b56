//! Match scoring.
//!
//! Scores a [`Query`] against an arbitrary payload. Every score lies in
//! [0, 1]:
//! - text queries take the best fuzzy similarity over all string leaves
//! - pattern queries are 1.0 if any string leaf matches, else 0.0
//! - structured queries are the fraction of criteria the mapping satisfies

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::ControlFlow;

pub use regex::Regex;

use crate::error::Result;
use crate::types::SearchResult;
use crate::value::{Leaf, Value};

/// Minimum similarity for a structured field to count as matched
pub const STRUCTURED_MATCH_THRESHOLD: f64 = 0.7;

/// Expected value for one field of a structured query
#[derive(Debug, Clone)]
pub enum Criterion {
    /// Exact equality; string expectations also match fuzzily
    Equals(Value),
    /// Fuzzy text similarity against the field
    Fuzzy(String),
    /// Regex match against any string inside the field
    Pattern(Regex),
}

/// A search query
#[derive(Debug, Clone)]
pub enum Query {
    Text(String),
    Pattern(Regex),
    Structured(BTreeMap<String, Criterion>),
}

impl Query {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Compile a pattern query; invalid expressions are rejected here.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(Self::Pattern(Regex::new(pattern)?))
    }

    pub fn structured<I, K>(criteria: I) -> Self
    where
        I: IntoIterator<Item = (K, Criterion)>,
        K: Into<String>,
    {
        Self::Structured(criteria.into_iter().map(|(k, c)| (k.into(), c)).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Pattern(_) => "pattern",
            Self::Structured(_) => "structured",
        }
    }
}

/// Scores payloads against queries.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    structured_threshold: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            structured_threshold: STRUCTURED_MATCH_THRESHOLD,
        }
    }
}

impl Scorer {
    pub fn new(structured_threshold: f64) -> Self {
        Self {
            structured_threshold: structured_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn score(&self, query: &Query, payload: &Value) -> f64 {
        match query {
            Query::Text(text) => fuzzy_score(&lowered_chars(text), payload),
            Query::Pattern(pattern) => pattern_score(pattern, payload),
            Query::Structured(criteria) => self.structured_score(criteria, payload),
        }
    }

    fn structured_score(&self, criteria: &BTreeMap<String, Criterion>, payload: &Value) -> f64 {
        let Some(fields) = payload.as_map() else {
            return 0.0;
        };
        if criteria.is_empty() {
            return 0.0;
        }

        let matched = criteria
            .iter()
            .filter(|(field, criterion)| {
                let Some(actual) = fields.get(field.as_str()) else {
                    return false;
                };
                match criterion {
                    Criterion::Equals(expected) => {
                        actual == expected
                            || expected.as_str().is_some_and(|text| {
                                fuzzy_score(&lowered_chars(text), actual) >= self.structured_threshold
                            })
                    }
                    Criterion::Fuzzy(text) => {
                        fuzzy_score(&lowered_chars(text), actual) >= self.structured_threshold
                    }
                    Criterion::Pattern(pattern) => pattern_score(pattern, actual) >= self.structured_threshold,
                }
            })
            .count();

        matched as f64 / criteria.len() as f64
    }
}

/// Score with the default structured threshold.
pub fn score(query: &Query, payload: &Value) -> f64 {
    Scorer::default().score(query, payload)
}

/// Order results by score descending, then most recent first.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
}

/// Normalized similarity of two strings, case-insensitive.
///
/// Ratcliff/Obershelp: twice the number of characters in matching blocks
/// over the combined length.
pub fn similarity(a: &str, b: &str) -> f64 {
    similarity_chars(&lowered_chars(a), &lowered_chars(b))
}

fn lowered_chars(s: &str) -> Vec<char> {
    s.to_lowercase().chars().collect()
}

fn fuzzy_score(query: &[char], payload: &Value) -> f64 {
    let mut best: f64 = 0.0;
    let _ = payload.walk_strings(&mut |leaf| {
        if let Leaf::Str(text) = leaf {
            best = best.max(similarity_chars(query, &lowered_chars(text)));
            if best >= 1.0 {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
    best
}

fn pattern_score(pattern: &Regex, payload: &Value) -> f64 {
    let found = payload.walk_strings(&mut |leaf| match leaf {
        Leaf::Str(text) if pattern.is_match(text) => ControlFlow::Break(()),
        _ => ControlFlow::Continue(()),
    });
    if found.is_break() { 1.0 } else { 0.0 }
}

fn similarity_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * matching_chars(a, b)) as f64 / total as f64
}

/// Total length of the matching blocks between `a` and `b`.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((a_lo, a_hi, b_lo, b_hi)) = pending.pop() {
        let (i, j, len) = longest_common_block(&a[a_lo..a_hi], &b[b_lo..b_hi]);
        if len == 0 {
            continue;
        }
        matched += len;
        let (i, j) = (a_lo + i, b_lo + j);
        pending.push((a_lo, i, b_lo, j));
        pending.push((i + len, a_hi, j + len, b_hi));
    }

    matched
}

/// Longest common substring as (start in a, start in b, length); earliest wins ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let len = current[j + 1];
            if len > best.2 {
                best = (i + 1 - len, j + 1 - len, len);
            }
        }
        std::mem::swap(&mut prev, &mut current);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryTier;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn payload(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("abcd", "abcd"), 1.0);
        assert_eq!(similarity("ABCD", "abcd"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        // "abcd" vs "bcde": one block "bcd" -> 2*3/8
        assert!((similarity("abcd", "bcde") - 0.75).abs() < 1e-9);
        // Blocks on both sides of the longest match are counted
        // "qabxcd" vs "abycdf": "ab" + "cd" -> 2*4/12
        assert!((similarity("qabxcd", "abycdf") - 8.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_text_query_takes_best_leaf() {
        let data = payload(json!({
            "title": "Onboarding interview",
            "notes": ["checkout flow is confusing", {"quote": "pricing page"}],
            "count": 7
        }));
        assert_eq!(score(&Query::text("pricing page"), &data), 1.0);

        let partial = score(&Query::text("checkout flow"), &data);
        assert!(partial > 0.5 && partial < 1.0);

        assert_eq!(score(&Query::text("anything"), &payload(json!(42))), 0.0);
        assert_eq!(score(&Query::text("anything"), &payload(json!({"no": null}))), 0.0);
    }

    #[test]
    fn test_text_query_ignores_keys() {
        let data = payload(json!({"pricing": 1}));
        assert_eq!(score(&Query::text("pricing"), &data), 0.0);
    }

    #[test]
    fn test_pattern_query_is_binary() {
        let data = payload(json!({"log": ["ok", "error: disk full"]}));
        let hit = Query::pattern(r"error: \w+").unwrap();
        let miss = Query::pattern(r"^fatal").unwrap();

        assert_eq!(score(&hit, &data), 1.0);
        assert_eq!(score(&miss, &data), 0.0);
        assert_eq!(score(&hit, &payload(json!("error: x"))), 1.0);
        assert!(Query::pattern("(unclosed").is_err());
    }

    #[test]
    fn test_structured_query() {
        let data = payload(json!({"status": "active", "priority": 2, "owner": "research team"}));

        let query = Query::structured([
            ("status", Criterion::Equals(Value::from("active"))),
            ("priority", Criterion::Equals(Value::Int(3))),
            ("owner", Criterion::Fuzzy("research teams".into())),
            ("missing", Criterion::Equals(Value::Null)),
        ]);
        assert_eq!(score(&query, &data), 0.5);

        let query = Query::structured([("owner", Criterion::Pattern(Regex::new("^research").unwrap()))]);
        assert_eq!(score(&query, &data), 1.0);

        // Non-mapping payloads never match
        assert_eq!(score(&query, &payload(json!(["research"]))), 0.0);
        assert_eq!(score(&Query::structured(Vec::<(String, Criterion)>::new()), &data), 0.0);
    }

    #[test]
    fn test_structured_threshold_is_inclusive() {
        // "abcdefghij" vs "abcdefg" -> 2*7/17 ~ 0.82; "abcdefghij" vs "abcde" -> 2*5/15 ~ 0.67
        let data = payload(json!({"name": "abcdefghij"}));
        let near = Query::structured([("name", Criterion::Fuzzy("abcdefg".into()))]);
        let far = Query::structured([("name", Criterion::Fuzzy("abcde".into()))]);
        assert_eq!(score(&near, &data), 1.0);
        assert_eq!(score(&far, &data), 0.0);

        let lenient = Scorer::new(0.6);
        assert_eq!(lenient.score(&far, &data), 1.0);
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let data = payload(json!({"a": ["x", "yy", {"b": "zzz"}], "c": "xyz"}));
        for query in [
            Query::text("xy"),
            Query::text(""),
            Query::pattern("z+").unwrap(),
            Query::structured([("a", Criterion::Fuzzy("x".into())), ("c", Criterion::Fuzzy("xyz".into()))]),
        ] {
            let s = score(&query, &data);
            assert!((0.0..=1.0).contains(&s), "{} scored {}", query.kind(), s);
        }
    }

    #[test]
    fn test_sort_results_breaks_ties_by_recency() {
        let now = Utc::now();
        let result = |key: &str, score: f64, age_secs: i64| SearchResult {
            key: key.into(),
            payload: Value::Null,
            tier: MemoryTier::ShortTerm,
            timestamp: now - Duration::seconds(age_secs),
            score,
        };
        let mut results = vec![
            result("old-high", 0.9, 100),
            result("low", 0.2, 0),
            result("new-high", 0.9, 10),
        ];
        sort_results(&mut results);
        let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["new-high", "old-high", "low"]);
    }
}
