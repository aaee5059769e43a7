//! Counter webhook handlers.
//!
//! - `POST /increment?pod_name=...` (alias `/register-job`)
//! - `POST /decrement?pod_name=...` (alias `/unregister-job`)
//!
//! Each request runs exactly one engine call. The response body is the new
//! counter value as plain text.

use std::time::Instant;

use axum::extract::{Query, State};
use serde::Deserialize;

use jobtrack_core::error::JobTrackError;
use jobtrack_core::Delta;

use crate::app_state::AppState;
use crate::transport::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PodQuery {
    pub pod_name: Option<String>,
}

pub async fn increment(
    State(app): State<AppState>,
    Query(q): Query<PodQuery>,
) -> Result<String, ApiError> {
    update(app, q, Delta::Increment).await
}

pub async fn decrement(
    State(app): State<AppState>,
    Query(q): Query<PodQuery>,
) -> Result<String, ApiError> {
    update(app, q, Delta::Decrement).await
}

async fn update(app: AppState, q: PodQuery, delta: Delta) -> Result<String, ApiError> {
    let pod = q
        .pod_name
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ApiError::new(
                delta,
                JobTrackError::InvalidRequest("missing pod_name query parameter".into()),
            )
        })?;

    let started = Instant::now();
    let op = delta.as_str();
    let res = app
        .engine()
        .apply_detailed(&pod, delta, app.shutdown_token())
        .await;

    let metrics = app.metrics();
    metrics.update_duration.observe(&[("op", op)], started.elapsed());

    match res {
        Ok(applied) => {
            metrics.updates.inc(&[("op", op), ("outcome", "ok")]);
            if applied.attempts > 1 {
                metrics
                    .write_conflicts
                    .add(&[("op", op)], u64::from(applied.attempts - 1));
            }
            tracing::info!(
                pod = %pod,
                op,
                value = applied.value,
                attempts = applied.attempts,
                "{} label updated",
                app.engine().config().policy.label
            );
            Ok(applied.value.to_string())
        }
        Err(e) => {
            metrics
                .updates
                .inc(&[("op", op), ("outcome", e.client_code().as_str())]);
            if let JobTrackError::ConflictRetriesExhausted { attempts } = e {
                metrics.write_conflicts.add(&[("op", op)], u64::from(attempts));
            }
            Err(ApiError::new(delta, e).with_pod(pod))
        }
    }
}
