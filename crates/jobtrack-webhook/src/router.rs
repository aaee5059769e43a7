//! Axum router wiring.
//!
//! Counter routes accept POST only; axum answers any other method with 405.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/increment", post(transport::webhook::increment))
        .route("/decrement", post(transport::webhook::decrement))
        .route("/register-job", post(transport::webhook::increment))
        .route("/unregister-job", post(transport::webhook::decrement))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .layer(middleware::from_fn(transport::access_log::access_log))
        .with_state(state)
}
