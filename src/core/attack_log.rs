//! Append-only record of detection events.
//!
//! Events go to a durable [`EventStore`]; reads come back newest first and
//! the aggregate view is derived from the same stored events, so per-type
//! counts always agree with what `query` returns.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::error;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::fingerprint::{ClientIdentity, ClientMetadata};
use crate::core::pattern_detector::SignatureFamily;
use crate::models::{AttackLogBackend, AttackLogConfig};
use crate::utils::format_store_key;

/// Errors that can occur while persisting or reading attack events
#[derive(Error, Debug)]
pub enum AttackLogError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Attack log append timed out after {0:?}")]
    Timeout(Duration),
}

/// Closed detection taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttackType {
    RateAbuse,
    InjectionAttempt,
    BruteForce,
    HoneypotHit,
}

impl AttackType {
    pub const ALL: [AttackType; 4] = [
        AttackType::RateAbuse,
        AttackType::InjectionAttempt,
        AttackType::BruteForce,
        AttackType::HoneypotHit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttackType::RateAbuse => "RateAbuse",
            AttackType::InjectionAttempt => "InjectionAttempt",
            AttackType::BruteForce => "BruteForce",
            AttackType::HoneypotHit => "HoneypotHit",
        }
    }
}

impl fmt::Display for AttackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttackType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown attack type: {}", s))
    }
}

/// Endpoint that accepted the offending credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Register,
    Login,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Register => "register",
            Endpoint::Login => "login",
        }
    }
}

/// Sub-classification of an injection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InjectionContext {
    pub family: SignatureFamily,
    pub endpoint: Endpoint,
}

/// Immutable detection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackEvent {
    pub id: Uuid,
    pub identity: ClientIdentity,
    pub url: String,
    #[serde(rename = "type")]
    pub attack_type: AttackType,
    pub payload: String,
    #[serde(rename = "detectedAt")]
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection: Option<InjectionContext>,
    #[serde(default, rename = "clientMetadata", skip_serializing_if = "Option::is_none")]
    pub client_metadata: Option<ClientMetadata>,
}

impl AttackEvent {
    pub fn new(
        identity: ClientIdentity,
        url: impl Into<String>,
        attack_type: AttackType,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            url: url.into(),
            attack_type,
            payload: payload.into(),
            detected_at: Utc::now(),
            injection: None,
            client_metadata: None,
        }
    }

    pub fn with_injection(mut self, context: InjectionContext) -> Self {
        self.injection = Some(context);
        self
    }

    pub fn with_metadata(mut self, metadata: ClientMetadata) -> Self {
        self.client_metadata = Some(metadata);
        self
    }
}

/// Read filter for [`AttackLog::query`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    #[serde(rename = "type")]
    pub attack_type: Option<AttackType>,
    pub identity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl EventFilter {
    fn accepts(&self, event: &AttackEvent) -> bool {
        self.attack_type.map_or(true, |t| event.attack_type == t)
            && self
                .identity
                .as_deref()
                .map_or(true, |identity| event.identity.as_str() == identity)
            && self.since.map_or(true, |since| event.detected_at >= since)
    }
}

/// Counts per taxonomy type, plus injection breakdowns
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttackSummary {
    pub total: u64,
    pub by_type: BTreeMap<AttackType, u64>,
    pub injection_by_family: BTreeMap<SignatureFamily, u64>,
    pub injection_by_endpoint: BTreeMap<Endpoint, u64>,
}

impl AttackSummary {
    fn tally(events: &[AttackEvent]) -> Self {
        let mut summary = AttackSummary {
            by_type: AttackType::ALL.iter().map(|t| (*t, 0)).collect(),
            ..Default::default()
        };
        for event in events {
            summary.total += 1;
            *summary.by_type.entry(event.attack_type).or_default() += 1;
            if let Some(context) = event.injection {
                *summary.injection_by_family.entry(context.family).or_default() += 1;
                *summary.injection_by_endpoint.entry(context.endpoint).or_default() += 1;
            }
        }
        summary
    }
}

/// Durable sink for attack events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event. Must not return `Ok` unless the event is stored.
    async fn append(&self, event: &AttackEvent) -> Result<(), AttackLogError>;

    /// Every stored event in append order
    async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError>;
}

/// JSON-lines file, one event per line.
///
/// The file is opened once in append mode. Each event is a single write of
/// one complete line, so concurrent appends land whole without a shared lock.
pub struct FileEventStore {
    path: PathBuf,
    file: Arc<std::fs::File>,
}

impl FileEventStore {
    /// Open `path` for appending, creating it and its parent directories
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AttackLogError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Arc::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn append(&self, event: &AttackEvent) -> Result<(), AttackLogError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            (&*file).write_all(&line)?;
            file.sync_data()
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))??;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_lines(contents.lines()))
    }
}

/// Redis list, appended with RPUSH
pub struct RedisEventStore {
    conn: ConnectionManager,
    key: String,
}

impl RedisEventStore {
    pub async fn connect(url: &str, key: &str) -> Result<Self, AttackLogError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key: format_store_key("honeypot", key),
        })
    }
}

#[async_trait]
impl EventStore for RedisEventStore {
    async fn append(&self, event: &AttackEvent) -> Result<(), AttackLogError> {
        let event_json = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.key, event_json).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError> {
        let mut conn = self.conn.clone();
        let lines: Vec<String> = conn.lrange(&self.key, 0, -1).await?;
        Ok(parse_lines(lines.iter().map(String::as_str)))
    }
}

/// Process-local store, for tests and throwaway runs
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<AttackEvent>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, event: &AttackEvent) -> Result<(), AttackLogError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError> {
        Ok(self.events.read().await.clone())
    }
}

fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<AttackEvent> {
    lines
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<AttackEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                error!("Skipping unreadable attack event: {}", e);
                None
            }
        })
        .collect()
}

/// Attack log service
#[derive(Clone)]
pub struct AttackLog {
    store: Arc<dyn EventStore>,
    append_timeout: Duration,
}

impl AttackLog {
    pub fn new(store: Arc<dyn EventStore>, append_timeout: Duration) -> Self {
        Self {
            store,
            append_timeout,
        }
    }

    /// Build the store selected in configuration
    pub async fn from_config(config: &AttackLogConfig) -> Result<Self, AttackLogError> {
        let store: Arc<dyn EventStore> = match config.backend {
            AttackLogBackend::File => Arc::new(FileEventStore::open(&config.file_path)?),
            AttackLogBackend::Redis => {
                Arc::new(RedisEventStore::connect(&config.redis_url, &config.redis_key).await?)
            }
            AttackLogBackend::Memory => Arc::new(MemoryEventStore::new()),
        };
        Ok(Self::new(store, Duration::from_millis(config.append_timeout_ms)))
    }

    /// Durably persist `event`. Failures and timeouts are returned, never swallowed.
    pub async fn append(&self, event: &AttackEvent) -> Result<(), AttackLogError> {
        match tokio::time::timeout(self.append_timeout, self.store.append(event)).await {
            Ok(result) => result,
            Err(_) => Err(AttackLogError::Timeout(self.append_timeout)),
        }
    }

    /// Matching events, newest first
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<AttackEvent>, AttackLogError> {
        let mut events = self.store.load_all().await?;
        events.retain(|event| filter.accepts(event));
        // Reverse first so equal timestamps keep newest-appended first.
        events.reverse();
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    /// Per-type counts and total over every stored event
    pub async fn aggregate(&self) -> Result<AttackSummary, AttackLogError> {
        let events = self.store.load_all().await?;
        Ok(AttackSummary::tally(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    struct UnavailableStore;

    #[async_trait]
    impl EventStore for UnavailableStore {
        async fn append(&self, _event: &AttackEvent) -> Result<(), AttackLogError> {
            Err(AttackLogError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "sink offline",
            )))
        }

        async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError> {
            Ok(Vec::new())
        }
    }

    struct StalledStore;

    #[async_trait]
    impl EventStore for StalledStore {
        async fn append(&self, _event: &AttackEvent) -> Result<(), AttackLogError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn load_all(&self) -> Result<Vec<AttackEvent>, AttackLogError> {
            Ok(Vec::new())
        }
    }

    fn memory_log() -> AttackLog {
        AttackLog::new(Arc::new(MemoryEventStore::new()), Duration::from_secs(1))
    }

    fn event(identity: &str, attack_type: AttackType, offset_secs: i64) -> AttackEvent {
        let mut event = AttackEvent::new(ClientIdentity::new(identity), "/login", attack_type, "payload");
        event.detected_at = Utc::now() + ChronoDuration::seconds(offset_secs);
        event
    }

    #[tokio::test]
    async fn test_query_returns_newest_first() {
        let log = memory_log();
        log.append(&event("a", AttackType::RateAbuse, -30)).await.unwrap();
        log.append(&event("b", AttackType::BruteForce, 0)).await.unwrap();
        log.append(&event("c", AttackType::HoneypotHit, -10)).await.unwrap();

        let events = log.query(&EventFilter::default()).await.unwrap();
        let order: Vec<&str> = events.iter().map(|e| e.identity.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_filter_by_type_identity_and_limit() {
        let log = memory_log();
        for i in 0..4 {
            log.append(&event("a", AttackType::RateAbuse, i)).await.unwrap();
        }
        log.append(&event("b", AttackType::RateAbuse, 10)).await.unwrap();
        log.append(&event("a", AttackType::HoneypotHit, 20)).await.unwrap();

        let filter = EventFilter {
            attack_type: Some(AttackType::RateAbuse),
            identity: Some("a".to_string()),
            limit: Some(2),
            ..Default::default()
        };
        let events = log.query(&filter).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.attack_type == AttackType::RateAbuse && e.identity.as_str() == "a"));
    }

    #[tokio::test]
    async fn test_aggregate_matches_query() {
        let log = memory_log();
        let kinds = [
            AttackType::RateAbuse,
            AttackType::RateAbuse,
            AttackType::InjectionAttempt,
            AttackType::HoneypotHit,
            AttackType::RateAbuse,
            AttackType::BruteForce,
        ];
        for (i, kind) in kinds.iter().enumerate() {
            let mut e = event("x", *kind, i as i64);
            if *kind == AttackType::InjectionAttempt {
                e = e.with_injection(InjectionContext {
                    family: SignatureFamily::Injection,
                    endpoint: Endpoint::Register,
                });
            }
            log.append(&e).await.unwrap();
        }

        let summary = log.aggregate().await.unwrap();
        assert_eq!(summary.total, kinds.len() as u64);
        assert_eq!(summary.by_type.values().sum::<u64>(), summary.total);
        for kind in AttackType::ALL {
            let filter = EventFilter {
                attack_type: Some(kind),
                ..Default::default()
            };
            let filtered = log.query(&filter).await.unwrap().len() as u64;
            assert_eq!(summary.by_type[&kind], filtered, "{}", kind);
        }
        assert_eq!(summary.injection_by_endpoint[&Endpoint::Register], 1);
    }

    #[tokio::test]
    async fn test_unavailable_sink_fails_loudly() {
        let log = AttackLog::new(Arc::new(UnavailableStore), Duration::from_secs(1));
        let result = log.append(&event("a", AttackType::HoneypotHit, 0)).await;
        assert!(matches!(result, Err(AttackLogError::IoError(_))));
    }

    #[tokio::test]
    async fn test_stalled_sink_times_out() {
        let log = AttackLog::new(Arc::new(StalledStore), Duration::from_millis(20));
        let result = log.append(&event("a", AttackType::HoneypotHit, 0)).await;
        assert!(matches!(result, Err(AttackLogError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("attacks.jsonl");

        let first = AttackLog::new(Arc::new(FileEventStore::open(&path).unwrap()), Duration::from_secs(1));
        let first_event = event("203.0.113.1", AttackType::InjectionAttempt, 0).with_injection(InjectionContext {
            family: SignatureFamily::Script,
            endpoint: Endpoint::Login,
        });
        first.append(&first_event).await.unwrap();
        first.append(&event("203.0.113.2", AttackType::HoneypotHit, 1)).await.unwrap();

        let reopened = AttackLog::new(Arc::new(FileEventStore::open(&path).unwrap()), Duration::from_secs(1));
        let events = reopened.query(&EventFilter::default()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], first_event);
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::open(dir.path().join("absent.jsonl")).unwrap();
        assert!(tokio_test::block_on(store.load_all()).unwrap().is_empty());

        std::fs::remove_file(store.path()).unwrap();
        assert!(tokio_test::block_on(store.load_all()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_file_appends_land_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attacks.jsonl");
        let log = AttackLog::new(Arc::new(FileEventStore::open(&path).unwrap()), Duration::from_secs(5));

        let events: Vec<AttackEvent> = (0..50)
            .map(|i| event(&format!("203.0.113.{}", i), AttackType::HoneypotHit, 0))
            .collect();
        let results = futures::future::join_all(events.iter().map(|e| log.append(e))).await;
        assert!(results.iter().all(Result::is_ok));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 50);
        assert!(contents
            .lines()
            .all(|line| serde_json::from_str::<AttackEvent>(line).is_ok()));
        assert_eq!(log.aggregate().await.unwrap().total, 50);
    }

    #[test]
    fn test_persisted_layout_field_names() {
        let json = serde_json::to_value(event("a", AttackType::BruteForce, 0)).unwrap();
        assert_eq!(json["type"], "BruteForce");
        assert_eq!(json["identity"], "a");
        assert_eq!(json["url"], "/login");
        assert!(json.get("detectedAt").is_some());
        assert!(json.get("clientMetadata").is_none());
    }

    #[test]
    fn test_attack_type_parses_case_insensitively() {
        assert_eq!("honeypothit".parse::<AttackType>(), Ok(AttackType::HoneypotHit));
        assert!("Phishing".parse::<AttackType>().is_err());
    }
}
