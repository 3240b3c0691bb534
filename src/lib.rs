//! Turnstile - Per-Caller Admission Control
//!
//! This crate implements an in-process rate limiter that decides, for each
//! request tagged with a caller identifier, whether it may proceed now. Each
//! caller gets a rolling window of admissions bounded by a capacity, with an
//! optional absolute quota checked against the same live count. A thin HTTP
//! surface exposes the limiter to other services.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
