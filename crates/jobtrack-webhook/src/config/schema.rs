use std::collections::BTreeMap;
use std::net::SocketAddr;

use jobtrack_core::counter::{CounterPolicy, DEFAULT_COUNTER_LABEL};
use jobtrack_core::error::{JobTrackError, Result};
use jobtrack_core::Selector;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub version: u32,

    #[serde(default)]
    pub webhook: WebhookSection,

    #[serde(default)]
    pub target: TargetSection,

    #[serde(default)]
    pub counter: CounterSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub store: StoreSection,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            version: 1,
            webhook: WebhookSection::default(),
            target: TargetSection::default(),
            counter: CounterSection::default(),
            retry: RetrySection::default(),
            store: StoreSection::default(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(JobTrackError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.webhook.validate()?;
        self.target.validate()?;
        self.counter.policy().validate()?;
        self.retry.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Budget for all store interaction inside one request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Drain budget for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for WebhookSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl WebhookSection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(100..=300_000).contains(&self.request_timeout_ms) {
            return Err(JobTrackError::Config(
                "webhook.request_timeout_ms must be between 100 and 300000".into(),
            ));
        }
        if !(1_000..=600_000).contains(&self.shutdown_timeout_ms) {
            return Err(JobTrackError::Config(
                "webhook.shutdown_timeout_ms must be between 1000 and 600000".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            JobTrackError::Config(format!(
                "webhook.listen must be a valid socket address ({}): {e}",
                self.listen
            ))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_request_timeout_ms() -> u64 {
    15_000
}
fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Restricts which pods may be mutated.
    #[serde(default)]
    pub label_selector: String,
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            label_selector: String::new(),
        }
    }
}

impl TargetSection {
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(JobTrackError::Config("target.namespace must not be empty".into()));
        }
        self.selector()?;
        Ok(())
    }

    pub fn selector(&self) -> Result<Selector> {
        Selector::parse(&self.label_selector)
    }
}

fn default_namespace() -> String {
    "default".into()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterSection {
    #[serde(default = "default_label")]
    pub label: String,

    #[serde(default = "default_true")]
    pub remove_at_zero: bool,

    #[serde(default)]
    pub allow_negative: bool,
}

impl Default for CounterSection {
    fn default() -> Self {
        Self {
            label: default_label(),
            remove_at_zero: true,
            allow_negative: false,
        }
    }
}

impl CounterSection {
    pub fn policy(&self) -> CounterPolicy {
        CounterPolicy {
            label: self.label.clone(),
            remove_at_zero: self.remove_at_zero,
            allow_negative: self.allow_negative,
        }
    }
}

fn default_label() -> String {
    DEFAULT_COUNTER_LABEL.into()
}
fn default_true() -> bool {
    true
}

/// Conflict retry schedule. Defaults match client-go's `retry.DefaultBackoff`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default = "default_jitter")]
    pub jitter: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            factor: default_factor(),
            jitter: default_jitter(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.max_attempts) {
            return Err(JobTrackError::Config(
                "retry.max_attempts must be between 1 and 1000".into(),
            ));
        }
        if !(1.0..=100.0).contains(&self.factor) {
            return Err(JobTrackError::Config(
                "retry.factor must be between 1.0 and 100.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(JobTrackError::Config(
                "retry.jitter must be between 0.0 and 1.0".into(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(JobTrackError::Config(
                "retry.max_backoff_ms must be >= initial_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    4
}
fn default_initial_backoff_ms() -> u64 {
    10
}
fn default_factor() -> f64 {
    5.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_max_backoff_ms() -> u64 {
    1_000
}

/// In-memory store seed.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub pods: Vec<SeedPod>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedPod {
    pub name: String,
    /// Defaults to `target.namespace`.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}
