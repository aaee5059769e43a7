//! HTTP mapping for engine errors.
//!
//! The caller sees a status code and a short plain-text diagnostic. The full
//! error goes to the log when the response is built, independent of the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use jobtrack_core::error::{ClientCode, JobTrackError};
use jobtrack_core::Delta;

#[derive(Debug)]
pub struct ApiError {
    op: Delta,
    pod: Option<String>,
    err: JobTrackError,
}

impl ApiError {
    pub fn new(op: Delta, err: JobTrackError) -> Self {
        Self { op, pod: None, err }
    }

    pub fn with_pod(mut self, pod: String) -> Self {
        self.pod = Some(pod);
        self
    }

    pub fn status(&self) -> StatusCode {
        status_for(&self.err)
    }
}

pub fn status_for(err: &JobTrackError) -> StatusCode {
    match err.client_code() {
        ClientCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ClientCode::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client-visible text. Store internals stay in the log.
fn body_for(err: &JobTrackError) -> String {
    match err {
        JobTrackError::InvalidRequest(msg) => capitalize(msg),
        JobTrackError::NotFound { .. } => "Pod not found".into(),
        JobTrackError::CorruptCounterValue { label, value } => {
            format!("Invalid {label} label value: {value:?}")
        }
        JobTrackError::StoreUnavailable(_) => "Failed to list pods".into(),
        JobTrackError::WriteFailed(_) | JobTrackError::ConflictRetriesExhausted { .. } => {
            "Failed to update pod label".into()
        }
        other => capitalize(&other.to_string()),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let pod = self.pod.as_deref().unwrap_or("");
        let code = self.err.client_code().as_str();
        if status.is_server_error() {
            tracing::error!(
                pod,
                op = self.op.as_str(),
                code,
                error = %self.err,
                "counter update failed"
            );
        } else {
            tracing::warn!(
                pod,
                op = self.op.as_str(),
                code,
                error = %self.err,
                "counter update rejected"
            );
        }
        (status, body_for(&self.err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let nf = JobTrackError::NotFound {
            namespace: "default".into(),
            name: "x".into(),
        };
        assert_eq!(status_for(&nf), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&JobTrackError::InvalidRequest("x".into())),
            StatusCode::BAD_REQUEST
        );
        for e in [
            JobTrackError::CorruptCounterValue {
                label: "active-jobs".into(),
                value: "abc".into(),
            },
            JobTrackError::ConflictRetriesExhausted { attempts: 4 },
            JobTrackError::StoreUnavailable("down".into()),
            JobTrackError::WriteFailed("denied".into()),
            JobTrackError::Timeout,
            JobTrackError::Canceled,
        ] {
            assert_eq!(status_for(&e), StatusCode::INTERNAL_SERVER_ERROR, "{e}");
        }
    }

    #[test]
    fn bodies_hide_store_detail() {
        assert_eq!(
            body_for(&JobTrackError::StoreUnavailable("dial tcp 10.0.0.1:443".into())),
            "Failed to list pods"
        );
        assert_eq!(
            body_for(&JobTrackError::CorruptCounterValue {
                label: "active-jobs".into(),
                value: "abc".into(),
            }),
            "Invalid active-jobs label value: \"abc\""
        );
        assert_eq!(
            body_for(&JobTrackError::InvalidRequest("missing pod_name query parameter".into())),
            "Missing pod_name query parameter"
        );
    }
}
