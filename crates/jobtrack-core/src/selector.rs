//! Label selector (Kubernetes equality and set-based syntax).
//!
//! The selector restricts which pods the webhook may mutate. A pod that exists
//! but does not match is indistinguishable from a missing pod.
//!
//! Supported requirements, comma separated:
//! - `key=value`, `key==value`, `key!=value`
//! - `key in (a,b)`, `key notin (a,b)`
//! - `key` (exists), `!key` (does not exist)

use std::collections::BTreeMap;
use std::fmt;

use crate::counter::validate_label_key;
use crate::error::{JobTrackError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::In(k, vs) => labels.get(k).is_some_and(|v| vs.contains(v)),
            Requirement::NotIn(k, vs) => labels.get(k).map_or(true, |v| !vs.contains(v)),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Equals(k, v) => write!(f, "{k}={v}"),
            Requirement::NotEquals(k, v) => write!(f, "{k}!={v}"),
            Requirement::In(k, vs) => write!(f, "{k} in ({})", vs.join(",")),
            Requirement::NotIn(k, vs) => write!(f, "{k} notin ({})", vs.join(",")),
            Requirement::Exists(k) => write!(f, "{k}"),
            Requirement::DoesNotExist(k) => write!(f, "!{k}"),
        }
    }
}

/// Compiled selector. The empty selector matches every pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector that matches everything.
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn parse(expr: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for raw in split_top_level(expr)? {
            let raw = raw.trim();
            if raw.is_empty() {
                if expr.trim().is_empty() {
                    continue;
                }
                return Err(bad(expr, "empty requirement"));
            }
            requirements.push(parse_requirement(raw).map_err(|msg| bad(expr, msg))?);
        }
        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{r}")?;
        }
        Ok(())
    }
}

fn bad(expr: &str, msg: &str) -> JobTrackError {
    JobTrackError::Config(format!("invalid label selector {expr:?}: {msg}"))
}

/// Split on commas that are not inside a `( ... )` value list.
fn split_top_level(expr: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| bad(expr, "unbalanced parenthesis"))?;
            }
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(bad(expr, "unbalanced parenthesis"));
    }
    parts.push(&expr[start..]);
    Ok(parts)
}

fn parse_requirement(raw: &str) -> std::result::Result<Requirement, &'static str> {
    if let Some(key) = raw.strip_prefix('!') {
        let key = key.trim();
        check_key(key)?;
        return Ok(Requirement::DoesNotExist(key.to_string()));
    }

    if let Some((k, v)) = raw.split_once("!=") {
        return equality(k, v).map(|(k, v)| Requirement::NotEquals(k, v));
    }
    if let Some((k, v)) = raw.split_once("==") {
        return equality(k, v).map(|(k, v)| Requirement::Equals(k, v));
    }
    if let Some((k, v)) = raw.split_once('=') {
        return equality(k, v).map(|(k, v)| Requirement::Equals(k, v));
    }

    if let Some(open) = raw.find('(') {
        let head = raw[..open].trim();
        let list = raw[open..].trim();
        let inner = list
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or("malformed value list")?;
        let values = inner
            .split(',')
            .map(|v| v.trim().to_string())
            .collect::<Vec<_>>();
        for v in &values {
            check_value(v)?;
        }

        let mut words = head.split_whitespace();
        let (Some(key), Some(op), None) = (words.next(), words.next(), words.next()) else {
            return Err("expected `key in (...)` or `key notin (...)`");
        };
        check_key(key)?;
        return match op {
            "in" => Ok(Requirement::In(key.to_string(), values)),
            "notin" => Ok(Requirement::NotIn(key.to_string(), values)),
            _ => Err("unknown set operator"),
        };
    }

    check_key(raw)?;
    Ok(Requirement::Exists(raw.to_string()))
}

fn equality(k: &str, v: &str) -> std::result::Result<(String, String), &'static str> {
    let (k, v) = (k.trim(), v.trim());
    check_key(k)?;
    check_value(v)?;
    Ok((k.to_string(), v.to_string()))
}

fn check_key(k: &str) -> std::result::Result<(), &'static str> {
    validate_label_key(k).map_err(|_| "invalid label key")
}

/// Label values: empty, or up to 63 chars of `[A-Za-z0-9._-]` with
/// alphanumeric ends.
fn check_value(v: &str) -> std::result::Result<(), &'static str> {
    if v.is_empty() {
        return Ok(());
    }
    let ok = v.len() <= 63
        && v.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && v.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
        && v.bytes().last().is_some_and(|b| b.is_ascii_alphanumeric());
    if ok {
        Ok(())
    } else {
        Err("invalid label value")
    }
}
