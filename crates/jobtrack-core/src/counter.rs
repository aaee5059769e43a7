//! Counter label arithmetic.
//!
//! The counter lives in a single pod label. Absence means zero; any other
//! value must be a base-10 integer. Nothing here touches a store: the engine
//! reads a snapshot, calls [`read_counter`], [`Delta::apply`] and
//! [`write_counter`], then hands the mutated snapshot back to the store.

use std::collections::BTreeMap;

use crate::error::{JobTrackError, Result};

/// Label key used when none is configured.
pub const DEFAULT_COUNTER_LABEL: &str = "active-jobs";

/// The two mutations a webhook call can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Increment,
    Decrement,
}

impl Delta {
    /// Operation name used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Delta::Increment => "increment",
            Delta::Decrement => "decrement",
        }
    }

    /// Compute the next counter value.
    ///
    /// Increment has no ceiling other than the integer range. Decrement floors
    /// at zero unless the policy allows negative values.
    pub fn apply(self, current: i64, policy: &CounterPolicy) -> Result<i64> {
        match self {
            Delta::Increment => current.checked_add(1).ok_or(JobTrackError::CounterOverflow),
            Delta::Decrement => {
                let next = current.checked_sub(1).ok_or(JobTrackError::CounterOverflow)?;
                if policy.allow_negative {
                    Ok(next)
                } else {
                    Ok(next.max(0))
                }
            }
        }
    }
}

/// How the counter label is named and written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterPolicy {
    pub label: String,
    /// Delete the label instead of writing `"0"`.
    pub remove_at_zero: bool,
    pub allow_negative: bool,
}

impl Default for CounterPolicy {
    fn default() -> Self {
        Self {
            label: DEFAULT_COUNTER_LABEL.to_string(),
            remove_at_zero: true,
            allow_negative: false,
        }
    }
}

impl CounterPolicy {
    pub fn validate(&self) -> Result<()> {
        validate_label_key(&self.label)
    }
}

/// Decode the counter from a label map.
pub fn read_counter(labels: &BTreeMap<String, String>, policy: &CounterPolicy) -> Result<i64> {
    let Some(raw) = labels.get(&policy.label) else {
        return Ok(0);
    };

    let corrupt = || JobTrackError::CorruptCounterValue {
        label: policy.label.clone(),
        value: raw.clone(),
    };

    raw.parse().map_err(|_| corrupt())
}

/// Store `value` into the label map according to the policy.
pub fn write_counter(labels: &mut BTreeMap<String, String>, value: i64, policy: &CounterPolicy) {
    if value == 0 && policy.remove_at_zero {
        labels.remove(&policy.label);
    } else {
        labels.insert(policy.label.clone(), value.to_string());
    }
}

/// Kubernetes qualified-name rules: `[prefix/]name`, where prefix is a DNS
/// subdomain (<= 253 chars) and name is 1..=63 chars of `[A-Za-z0-9._-]`
/// starting and ending with an alphanumeric.
pub fn validate_label_key(key: &str) -> Result<()> {
    let (prefix, name) = match key.split_once('/') {
        Some((p, n)) => (Some(p), n),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        let dns_ok = !prefix.is_empty()
            && prefix.len() <= 253
            && prefix.split('.').all(|part| {
                !part.is_empty()
                    && part.len() <= 63
                    && part
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
                    && !part.starts_with('-')
                    && !part.ends_with('-')
            });
        if !dns_ok {
            return Err(JobTrackError::Config(format!(
                "label key prefix must be a DNS subdomain: {key:?}"
            )));
        }
    }

    let name_ok = !name.is_empty()
        && name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && name.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
        && name.bytes().last().is_some_and(|b| b.is_ascii_alphanumeric());

    if !name_ok {
        return Err(JobTrackError::Config(format!("invalid label key: {key:?}")));
    }
    Ok(())
}
