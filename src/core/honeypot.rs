//! Canary routes.
//!
//! A canary path matches itself and anything below it (`/admin` matches
//! `/admin/users` but not `/administrator`). Paths are percent-decoded and
//! repeated slashes collapsed before matching; case and trailing slashes are
//! ignored. No two configured routes may overlap.

use thiserror::Error;

/// Body returned for every canary hit, whatever the method
pub const CANARY_RESPONSE_BODY: &str = "Not Found";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HoneypotError {
    #[error("Canary route must start with '/': {0}")]
    InvalidRoute(String),
    #[error("Canary routes overlap: {0} and {1}")]
    Overlap(String, String),
}

/// Fixed set of decoy routes
#[derive(Debug, Clone)]
pub struct HoneypotTrap {
    routes: Vec<String>,
}

impl HoneypotTrap {
    pub fn new<S: AsRef<str>>(routes: &[S]) -> Result<Self, HoneypotError> {
        let mut normalized: Vec<String> = Vec::with_capacity(routes.len());
        for route in routes {
            let route = route.as_ref();
            if !route.starts_with('/') || route.trim_end_matches('/').is_empty() {
                return Err(HoneypotError::InvalidRoute(route.to_string()));
            }
            let route = normalize(route);
            if let Some(existing) = normalized
                .iter()
                .find(|existing| covers(existing, &route) || covers(&route, existing))
            {
                return Err(HoneypotError::Overlap(existing.clone(), route));
            }
            normalized.push(route);
        }
        Ok(Self { routes: normalized })
    }

    /// The canary route `path` falls under, if any
    pub fn matches(&self, path: &str) -> Option<&str> {
        let path = normalize(path);
        self.routes
            .iter()
            .find(|route| covers(route, &path))
            .map(String::as_str)
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }
}

fn normalize(path: &str) -> String {
    let decoded = urlencoding::decode(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());

    let mut collapsed = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// `route` equals `path` or is a whole-segment prefix of it
fn covers(route: &str, path: &str) -> bool {
    path == route
        || (path.starts_with(route) && path.as_bytes().get(route.len()) == Some(&b'/'))
}
