//! HTTP transport: webhook handlers, error mapping, request logging.

pub mod access_log;
pub mod error;
pub mod webhook;

pub use error::ApiError;
