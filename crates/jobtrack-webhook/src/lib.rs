//! jobtrack webhook library entry.
//!
//! Wires configuration, the record store, the counter engine and the HTTP
//! surface together. Consumed by the binary (`main.rs`) and by integration
//! tests.

pub mod app_state;
pub mod config;
pub mod engine;
pub mod obs;
pub mod ops;
pub mod router;
pub mod store;
pub mod transport;
