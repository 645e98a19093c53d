//! Request security pipeline.
//!
//! Per request: canary check, then rate limit, then (for credential
//! endpoints) signature scan, then authentication with brute-force
//! bookkeeping. Every detection becomes one [`AttackEvent`]. Enrichment and
//! persistence run on a detached task, so the verdict never waits on the
//! geo lookup or the attack log.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{debug, error, warn};
use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::core::accounts::{AuthOutcome, Authenticator, Registration};
use crate::core::attack_log::{AttackEvent, AttackLog, AttackType, Endpoint, InjectionContext};
use crate::core::brute_force::BruteForceTracker;
use crate::core::fingerprint::ClientFingerprint;
use crate::core::geo::GeoLocator;
use crate::core::honeypot::{HoneypotError, HoneypotTrap};
use crate::core::pattern_detector::{DetectorError, Match, PatternDetector, SignatureFamily};
use crate::core::rate_limiter::{Admission, RateLimiter};
use crate::models::{Config, FingerprintConfig};
use crate::utils::truncate_snippet;

/// Fields whose raw values never reach an event payload when redaction is on
const SECRET_FIELDS: &[&str] = &["password"];

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Signature table error: {0}")]
    Detector(#[from] DetectorError),
    #[error("Honeypot configuration error: {0}")]
    Honeypot(#[from] HoneypotError),
}

/// Decision taken before any route handler runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    /// Rate limit exceeded
    Throttled,
    /// Canary route hit
    Canary,
}

/// Result of scanning credential fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Clean,
    Rejected { matches: Vec<Match> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success { account: String },
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
    Rejected,
}

/// Orchestrates every security component for one service
pub struct SecurityPipeline {
    rate_limiter: RateLimiter,
    detector: PatternDetector,
    brute_force: BruteForceTracker,
    honeypot: HoneypotTrap,
    attack_log: AttackLog,
    authenticator: Arc<dyn Authenticator>,
    geo: Option<Arc<GeoLocator>>,
    fingerprint: FingerprintConfig,
    redact_secrets: bool,
    max_payload_len: usize,
    /// Event writes not yet known to be finished
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl SecurityPipeline {
    pub fn from_config(
        config: &Config,
        attack_log: AttackLog,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            rate_limiter: RateLimiter::new(&config.rate_limit),
            detector: PatternDetector::with_extra(&config.detector.extra_signatures)?,
            brute_force: BruteForceTracker::new(&config.brute_force),
            honeypot: HoneypotTrap::new(&config.honeypot.routes)?,
            attack_log,
            authenticator,
            geo: GeoLocator::from_config(&config.geo).map(Arc::new),
            fingerprint: config.fingerprint.clone(),
            redact_secrets: config.attack_log.redact_secrets,
            max_payload_len: config.attack_log.max_payload_len,
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn fingerprint_config(&self) -> &FingerprintConfig {
        &self.fingerprint
    }

    pub fn attack_log(&self) -> &AttackLog {
        &self.attack_log
    }

    /// Canary check, then rate limit. Runs before route handlers.
    pub async fn intercept(&self, client: &ClientFingerprint, path: &str, url: &str) -> Verdict {
        if let Some(route) = self.honeypot.matches(path) {
            debug!("Canary route {} hit by {}", route, client.identity);
            counter!("honeypot_requests_total", 1, "verdict" => "canary");
            let event = AttackEvent::new(client.identity.clone(), url, AttackType::HoneypotHit, path);
            self.record(client, event);
            return Verdict::Canary;
        }

        match self.rate_limiter.admit(&client.identity) {
            Admission::Allow => {
                counter!("honeypot_requests_total", 1, "verdict" => "allow");
                Verdict::Proceed
            }
            Admission::Deny { count } => {
                counter!("honeypot_requests_total", 1, "verdict" => "throttled");
                let payload = format!(
                    "{} requests within {}s",
                    count,
                    self.rate_limiter_window_secs()
                );
                let event = AttackEvent::new(client.identity.clone(), url, AttackType::RateAbuse, payload);
                self.record(client, event);
                Verdict::Throttled
            }
        }
    }

    /// Scan credential fields; any match logs an injection attempt per family
    pub async fn screen(
        &self,
        client: &ClientFingerprint,
        endpoint: Endpoint,
        url: &str,
        fields: &[(&str, &str)],
    ) -> Screening {
        let matches = self.detector.scan(fields.iter().copied());
        if matches.is_empty() {
            return Screening::Clean;
        }

        let mut families: Vec<SignatureFamily> = matches.iter().map(|m| m.family).collect();
        families.sort();
        families.dedup();
        for family in families {
            let payload = self.injection_payload(fields, &matches, family);
            let event = AttackEvent::new(client.identity.clone(), url, AttackType::InjectionAttempt, payload)
                .with_injection(InjectionContext { family, endpoint });
            self.record(client, event);
        }
        Screening::Rejected { matches }
    }

    /// Screen, authenticate, then feed the brute-force tracker
    pub async fn login(&self, client: &ClientFingerprint, url: &str, email: &str, password: &str) -> LoginOutcome {
        let fields = [("email", email), ("password", password)];
        if let Screening::Rejected { .. } = self.screen(client, Endpoint::Login, url, &fields).await {
            return LoginOutcome::Rejected;
        }

        match self.authenticator.authenticate(email, password) {
            AuthOutcome::Success { account } => {
                self.brute_force.report_success(&client.identity, email);
                LoginOutcome::Success { account }
            }
            AuthOutcome::Failure => {
                if self.brute_force.report_failure(&client.identity, email) {
                    let payload = format!(
                        "account={} failures={} within {}s",
                        email,
                        self.brute_force.failures(&client.identity, email),
                        self.brute_force_window_secs()
                    );
                    let event = AttackEvent::new(client.identity.clone(), url, AttackType::BruteForce, payload);
                    self.record(client, event);
                }
                LoginOutcome::Failed
            }
        }
    }

    /// Screen registration fields, then hand over to the account collaborator
    pub async fn register(
        &self,
        client: &ClientFingerprint,
        url: &str,
        username: &str,
        email: &str,
        password: &str,
    ) -> RegisterOutcome {
        let fields = [("username", username), ("email", email), ("password", password)];
        if let Screening::Rejected { .. } = self.screen(client, Endpoint::Register, url, &fields).await {
            return RegisterOutcome::Rejected;
        }

        match self.authenticator.register(username, email, password) {
            Registration::Created => RegisterOutcome::Created,
            Registration::AlreadyExists => RegisterOutcome::AlreadyExists,
        }
    }

    /// Drop idle keys from both window maps
    pub fn sweep(&self, now: Instant) -> (usize, usize) {
        (self.rate_limiter.sweep(now), self.brute_force.sweep(now))
    }

    fn rate_limiter_window_secs(&self) -> u64 {
        self.rate_limiter.window().as_secs()
    }

    fn brute_force_window_secs(&self) -> u64 {
        self.brute_force.window().as_secs()
    }

    fn injection_payload(&self, fields: &[(&str, &str)], matches: &[Match], family: SignatureFamily) -> String {
        let mut parts = Vec::new();
        for (field, value) in fields {
            let hits: Vec<&Match> = matches
                .iter()
                .filter(|m| m.family == family && m.field == *field)
                .collect();
            if hits.is_empty() {
                continue;
            }
            let signatures: Vec<&str> = hits.iter().map(|m| m.signature.as_str()).collect();
            let fragments: Vec<String> = hits.iter().map(|m| format!("{:?}", m.fragment)).collect();
            let shown = if self.redact_secrets && SECRET_FIELDS.contains(field) {
                "[redacted]".to_string()
            } else {
                format!("{:?}", value)
            };
            parts.push(format!(
                "{}={} signatures={} fragments={}",
                field,
                shown,
                signatures.join(","),
                fragments.join(",")
            ));
        }
        parts.join(" | ")
    }

    /// Wait for every event handed off so far to be written (or to fail)
    pub async fn flush(&self) {
        let handles = std::mem::take(&mut *self.lock_pending());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Attack event writer task failed: {}", e);
            }
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bound the payload, then enrich and persist on a detached task. Append
    /// failures are surfaced in logs and metrics; they never change the
    /// response already decided.
    fn record(&self, client: &ClientFingerprint, mut event: AttackEvent) {
        event.payload = truncate_snippet(&event.payload, self.max_payload_len);
        warn!(
            "{} from {} on {}: {}",
            event.attack_type, event.identity, event.url, event.payload
        );
        counter!("honeypot_attack_events_total", 1, "type" => event.attack_type.as_str());

        let mut metadata = client.metadata.clone();
        let geo = self.geo.clone();
        let attack_log = self.attack_log.clone();
        let handle = tokio::spawn(async move {
            if let Some(geo) = geo {
                metadata.geo = geo.enrich(&metadata.ip).await;
            }
            let event = event.with_metadata(metadata);
            if let Err(e) = attack_log.append(&event).await {
                counter!("honeypot_attack_log_failures_total", 1);
                error!("Attack log append failed, detection degraded ({}): {}", event.id, e);
            }
        });

        let mut pending = self.lock_pending();
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }
}
