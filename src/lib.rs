//! Honeypot guard
//!
//! Intrusion detection middleware for a small chat service: per-client rate
//! limiting, credential field scanning, brute-force tracking, canary routes
//! and a durable attack log.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
