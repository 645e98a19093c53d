use serde::{Deserialize, Serialize};

use crate::core::pattern_detector::SignatureSpec;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client within the window
    pub max_requests: u32,
    /// Trailing window in seconds
    pub window_seconds: u64,
    /// Upper bound on tracked client identities
    pub max_tracked_keys: usize,
}

/// Brute-force tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BruteForceConfig {
    /// Failed logins per (client, account) that trigger a detection
    pub max_failures: u32,
    /// Trailing window in seconds
    pub window_seconds: u64,
    /// Upper bound on tracked (client, account) pairs
    pub max_tracked_keys: usize,
}

/// Canary route configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoneypotConfig {
    /// Decoy paths that no legitimate client requests
    pub routes: Vec<String>,
}

/// Pattern detector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Signatures appended to the built-in table
    #[serde(default)]
    pub extra_signatures: Vec<SignatureSpec>,
}

/// Durable sink selection for the attack log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttackLogBackend {
    File,
    Redis,
    Memory,
}

/// Attack log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackLogConfig {
    /// Which durable sink to use
    pub backend: AttackLogBackend,
    /// JSON lines file used by the `file` backend
    pub file_path: String,
    /// Redis connection URL used by the `redis` backend
    pub redis_url: String,
    /// Redis list holding the events
    pub redis_key: String,
    /// Upper bound on a single append, in milliseconds
    pub append_timeout_ms: u64,
    /// Keep raw password values out of payloads
    pub redact_secrets: bool,
    /// Maximum payload length in characters
    pub max_payload_len: usize,
}

/// Client fingerprint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Take the client address from X-Forwarded-For / X-Real-IP
    pub trust_forwarded_for: bool,
    /// Fold coarse browser/os attributes into the identity key
    pub include_user_agent: bool,
}

/// Geo enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Whether to look up client locations at all
    pub enabled: bool,
    /// Lookup endpoint, `{ip}` is replaced with the client address
    pub endpoint: String,
    /// Per-lookup timeout in milliseconds
    pub timeout_ms: u64,
}

/// Idle-key sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps, 0 disables the background task
    pub interval_seconds: u64,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub brute_force: BruteForceConfig,
    pub honeypot: HoneypotConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    pub attack_log: AttackLogConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    pub geo: GeoConfig,
    pub sweep: SweepConfig,
}

pub fn default_canary_routes() -> Vec<String> {
    [
        "/admin",
        "/wp-admin",
        "/wp-login.php",
        "/phpmyadmin",
        "/.env",
        "/.git/config",
        "/config.php",
        "/server-status",
        "/backup.sql",
    ]
    .iter()
    .map(|route| route.to_string())
    .collect()
}

/// Built-in defaults. The config loader layers the TOML file and environment
/// over these.
impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            rate_limit: RateLimitConfig {
                max_requests: 10,
                window_seconds: 10,
                max_tracked_keys: 100_000,
            },
            brute_force: BruteForceConfig {
                max_failures: 3,
                window_seconds: 60,
                max_tracked_keys: 100_000,
            },
            honeypot: HoneypotConfig {
                routes: default_canary_routes(),
            },
            detector: DetectorConfig::default(),
            attack_log: AttackLogConfig {
                backend: AttackLogBackend::File,
                file_path: "data/attack_log.jsonl".to_string(),
                redis_url: "redis://127.0.0.1:6379".to_string(),
                redis_key: "events".to_string(),
                append_timeout_ms: 2000,
                redact_secrets: true,
                max_payload_len: 256,
            },
            fingerprint: FingerprintConfig::default(),
            geo: GeoConfig {
                enabled: false,
                endpoint: "http://ip-api.com/json/{ip}".to_string(),
                timeout_ms: 300,
            },
            sweep: SweepConfig {
                interval_seconds: 30,
            },
        }
    }
}
