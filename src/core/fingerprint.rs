//! Per-request client identity.
//!
//! The identity is a grouping key for windowed state, never an authenticated
//! principal. It is derived from the origin address and, optionally, from
//! coarse user-agent attributes.

use std::fmt;
use std::net::IpAddr;

use actix_web::HttpRequest;
use serde::{Deserialize, Serialize};

use crate::core::geo::GeoInfo;
use crate::models::FingerprintConfig;

const UNKNOWN: &str = "unknown";

/// Heuristic grouping key for a client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse client attributes attached to attack events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub browser: String,
    pub os: String,
    pub device: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
}

/// Identity plus metadata for one inbound request
#[derive(Debug, Clone)]
pub struct ClientFingerprint {
    pub identity: ClientIdentity,
    pub metadata: ClientMetadata,
}

impl ClientFingerprint {
    /// Build a fingerprint from the connection address and request headers
    pub fn extract(
        config: &FingerprintConfig,
        peer_ip: Option<IpAddr>,
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Self {
        let forwarded = if config.trust_forwarded_for {
            forwarded_for
                .and_then(leftmost_ip)
                .or_else(|| real_ip.and_then(leftmost_ip))
        } else {
            None
        };
        let ip = forwarded
            .or(peer_ip)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());

        let browser = classify_browser(user_agent);
        let os = classify_os(user_agent);
        let device = classify_device(user_agent);

        let key = if config.include_user_agent {
            format!("{}|{}/{}", ip, browser, os)
        } else {
            ip.clone()
        };

        Self {
            identity: ClientIdentity::new(key),
            metadata: ClientMetadata {
                ip,
                user_agent: user_agent.map(str::to_string),
                browser: browser.to_string(),
                os: os.to_string(),
                device: device.to_string(),
                geo: None,
            },
        }
    }

    /// Fingerprint an actix request
    pub fn from_request(config: &FingerprintConfig, req: &HttpRequest) -> Self {
        Self::extract(
            config,
            req.peer_addr().map(|addr| addr.ip()),
            header_value(req, "X-Forwarded-For"),
            header_value(req, "X-Real-IP"),
            header_value(req, "User-Agent"),
        )
    }
}

fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

/// X-Forwarded-For is "client, proxy1, proxy2"; the client is leftmost.
fn leftmost_ip(header: &str) -> Option<IpAddr> {
    header.split(',').next()?.trim().parse().ok()
}

fn classify_browser(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return UNKNOWN;
    };
    let ua = ua.to_ascii_lowercase();
    if ua.contains("curl") || ua.contains("wget") || ua.contains("python") || ua.contains("go-http") {
        "script"
    } else if ua.contains("bot") || ua.contains("spider") || ua.contains("crawl") {
        "crawler"
    } else if ua.contains("edg/") {
        "edge"
    } else if ua.contains("firefox/") {
        "firefox"
    } else if ua.contains("chrome/") || ua.contains("chromium/") {
        "chrome"
    } else if ua.contains("safari/") {
        "safari"
    } else {
        "other"
    }
}

fn classify_os(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return UNKNOWN;
    };
    let ua = ua.to_ascii_lowercase();
    if ua.contains("android") {
        "android"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "ios"
    } else if ua.contains("windows") {
        "windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macos"
    } else if ua.contains("linux") {
        "linux"
    } else {
        "other"
    }
}

fn classify_device(user_agent: Option<&str>) -> &'static str {
    let Some(ua) = user_agent else {
        return UNKNOWN;
    };
    let ua = ua.to_ascii_lowercase();
    if ua.contains("ipad") || ua.contains("tablet") {
        "tablet"
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        "mobile"
    } else {
        "desktop"
    }
}
