//! Webhook config loader (strict parsing).

pub mod schema;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use jobtrack_core::error::{JobTrackError, Result};

pub use schema::{
    CounterSection, RetrySection, SeedPod, StoreSection, TargetSection, WebhookConfig,
    WebhookSection,
};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<WebhookConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| JobTrackError::Config(format!("read {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

/// Like [`load_from_file`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<WebhookConfig> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(s) => load_from_str(&s),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            let cfg = WebhookConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
        Err(e) => Err(JobTrackError::Config(format!(
            "read {} failed: {e}",
            path.display()
        ))),
    }
}

pub fn load_from_str(s: &str) -> Result<WebhookConfig> {
    let cfg: WebhookConfig = serde_yaml::from_str(s)
        .map_err(|e| JobTrackError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
