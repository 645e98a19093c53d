//! Core functionality for the honeypot guard.
//!
//! This module contains the security components: client fingerprinting,
//! sliding-window counting, rate limiting, signature scanning, brute-force
//! tracking, canary routes, the attack log and the pipeline tying them together.

pub mod accounts;
pub mod attack_log;
pub mod brute_force;
pub mod fingerprint;
pub mod geo;
pub mod honeypot;
pub mod pattern_detector;
pub mod pipeline;
pub mod rate_limiter;
pub mod sliding_window;

pub use accounts::{AccountDirectory, AuthOutcome, Authenticator};
pub use attack_log::{AttackEvent, AttackLog, AttackSummary, AttackType, EventFilter};
pub use brute_force::BruteForceTracker;
pub use fingerprint::{ClientFingerprint, ClientIdentity};
pub use honeypot::HoneypotTrap;
pub use pattern_detector::PatternDetector;
pub use pipeline::{SecurityPipeline, Verdict};
pub use rate_limiter::{Admission, RateLimiter};
pub use sliding_window::SlidingWindowCounter;
