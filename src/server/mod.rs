//! HTTP server for Liaison

pub mod http;

pub use http::{run, AppState};
