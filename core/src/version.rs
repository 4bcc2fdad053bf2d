//! Version tokens for optimistic concurrency.
//!
//! A [`VersionToken`] is a SHA-256 fingerprint of an aggregate's canonical
//! JSON serialization (object keys sorted at every level), base64-encoded
//! and quoted so it can be used verbatim as an HTTP entity tag.
//!
//! Identical logical state always yields an identical token, independent of
//! the order in which fields were sent.
//!
//! # Example
//!
//! ```
//! use plan_registry_core::version::{check_write, token_for_value};
//! use serde_json::json;
//!
//! let a = token_for_value(&json!({ "objectId": "p", "copay": 1 }));
//! let b = token_for_value(&json!({ "copay": 1, "objectId": "p" }));
//! assert_eq!(a, b);
//! assert!(check_write(&a, Some(b.as_str())).is_ok());
//! ```

use crate::plan::PlanAggregate;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

/// Content fingerprint of an aggregate, quoted (`"..."`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// The quoted token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the quoted token string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Weak comparison, as used by `If-None-Match`: a `W/` prefix on the
    /// candidate is ignored. `*` matches any token.
    #[must_use]
    pub fn matches_weak(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == self.0
    }

    /// Strong comparison, as used by `If-Match`: a weak candidate never
    /// matches. `*` matches any token.
    #[must_use]
    pub fn matches_strong(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        candidate == "*" || candidate == self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a conditional read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The caller's cached copy is current.
    Unchanged,
    /// The caller must receive the aggregate and its token.
    Modified,
}

/// A write precondition that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("precondition failed: expected {expected}, current {current}")]
pub struct PreconditionFailed {
    /// Token the caller supplied.
    pub expected: String,
    /// Token of the stored aggregate.
    pub current: VersionToken,
}

/// Token for the aggregate's current state.
#[must_use]
pub fn current_token(aggregate: &PlanAggregate) -> VersionToken {
    token_for_value(&aggregate.to_value())
}

/// Token for an arbitrary JSON value.
#[must_use]
pub fn token_for_value(value: &Value) -> VersionToken {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    VersionToken(format!("\"{}\"", STANDARD.encode(digest)))
}

/// Compare the current token against `If-None-Match`.
#[must_use]
pub fn check_read(current: &VersionToken, if_none_match: Option<&str>) -> Freshness {
    match if_none_match {
        Some(tag) if current.matches_weak(tag) => Freshness::Unchanged,
        _ => Freshness::Modified,
    }
}

/// Compare the current token against `If-Match` using strong comparison.
///
/// An absent precondition always proceeds.
///
/// # Errors
///
/// Returns [`PreconditionFailed`] when `if_match` is present and does not
/// refer to `current`.
pub fn check_write(current: &VersionToken, if_match: Option<&str>) -> Result<(), PreconditionFailed> {
    match if_match {
        Some(tag) if !current.matches_strong(tag) => Err(PreconditionFailed {
            expected: tag.to_string(),
            current: current.clone(),
        }),
        _ => Ok(()),
    }
}

/// Serialize with object keys sorted at every depth.
///
/// Does not rely on `serde_json::Map` ordering, which changes when the
/// `preserve_order` feature is enabled anywhere in the dependency graph.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}:", Value::String(key.clone()));
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}
