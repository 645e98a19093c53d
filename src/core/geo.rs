//! Optional IP geolocation enrichment.
//!
//! Lookups are bounded by a timeout and never fail the caller: any error
//! simply leaves the enrichment out.

use std::net::IpAddr;
use std::time::Duration;

use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::GeoConfig;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Lookup request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Lookup timed out")]
    Timeout,
    #[error("Lookup refused: {0}")]
    Refused(String),
}

/// Location attributes attached to client metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "regionName")]
    region: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Geolocation client
pub struct GeoLocator {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl GeoLocator {
    pub fn new(config: &GeoConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Build a locator only when enrichment is switched on
    pub fn from_config(config: &GeoConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config))
    }

    /// Look up `ip`, giving up silently on any failure
    pub async fn enrich(&self, ip: &str) -> Option<GeoInfo> {
        match self.lookup(ip).await {
            Ok(info) => info,
            Err(e) => {
                debug!("Geo lookup for {} skipped: {}", ip, e);
                None
            }
        }
    }

    /// Look up `ip`. Private and loopback addresses resolve to `None` without a request.
    pub async fn lookup(&self, ip: &str) -> Result<Option<GeoInfo>, GeoError> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return Ok(None);
        };
        if !is_public(&addr) {
            return Ok(None);
        }

        let url = self.endpoint.replace("{ip}", ip);
        let request = async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            response.json::<LookupResponse>().await
        };
        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| GeoError::Timeout)??;

        if body.status.as_deref() == Some("fail") {
            return Err(GeoError::Refused(body.message.unwrap_or_default()));
        }
        Ok(Some(GeoInfo {
            country: body.country,
            region: body.region,
            city: body.city,
        }))
    }
}

fn is_public(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}
