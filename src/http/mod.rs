//! HTTP surface for the admission controller.
//!
//! Translates decisions into responses; owns no limiter state of its own.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{router, AppState, AttemptRequest};
