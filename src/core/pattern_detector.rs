//! Heuristic signature scanning for user-supplied text fields.
//!
//! The signature table is data: each row names a family, a case-insensitive
//! pattern and a severity. Additional rows can be supplied through
//! configuration and are appended to the built-in set. Scanning is pure.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the built-in table changes
pub const SIGNATURE_SET_VERSION: u32 = 3;

/// Errors that can occur while building the detector
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Invalid pattern for signature {id}: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
    #[error("Duplicate signature id: {0}")]
    DuplicateId(String),
}

/// Signature family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFamily {
    /// SQL control syntax
    Injection,
    /// Markup and script injection
    Script,
}

impl SignatureFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureFamily::Injection => "injection",
            SignatureFamily::Script => "script",
        }
    }
}

impl fmt::Display for SignatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One row of the signature table, as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureSpec {
    pub id: String,
    pub family: SignatureFamily,
    pub pattern: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone)]
struct Signature {
    id: String,
    family: SignatureFamily,
    severity: Severity,
    regex: Regex,
}

/// A signature hit on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub field: String,
    pub signature: String,
    pub family: SignatureFamily,
    pub severity: Severity,
    /// The exact text that matched
    pub fragment: String,
}

const BUILTIN: &[(&str, SignatureFamily, &str, Severity, &str)] = &[
    ("sql-select", SignatureFamily::Injection, r"\bselect\b", Severity::Medium, "SELECT keyword"),
    ("sql-insert", SignatureFamily::Injection, r"\binsert\b", Severity::Medium, "INSERT keyword"),
    ("sql-update", SignatureFamily::Injection, r"\bupdate\b", Severity::Medium, "UPDATE keyword"),
    ("sql-delete", SignatureFamily::Injection, r"\bdelete\b", Severity::High, "DELETE keyword"),
    ("sql-drop", SignatureFamily::Injection, r"\bdrop\b", Severity::High, "DROP keyword"),
    ("sql-union", SignatureFamily::Injection, r"\bunion\b(\s+all)?\s+select\b", Severity::High, "UNION SELECT"),
    ("sql-comment", SignatureFamily::Injection, r"--|/\*", Severity::Medium, "SQL comment marker"),
    ("sql-terminator", SignatureFamily::Injection, r";", Severity::Low, "Statement terminator"),
    (
        "sql-bool-bypass",
        SignatureFamily::Injection,
        r#"['"]\s*or\s+['"]?\w+['"]?\s*=\s*['"]?\w+"#,
        Severity::High,
        "Boolean bypass such as ' OR 1=1",
    ),
    ("xss-script-tag", SignatureFamily::Script, r"<\s*/?\s*script\b", Severity::High, "<script> tag"),
    ("xss-js-uri", SignatureFamily::Script, r"javascript\s*:", Severity::High, "javascript: URI"),
    ("xss-event-handler", SignatureFamily::Script, r"\bon[a-z]+\s*=", Severity::Medium, "Inline event handler"),
    ("xss-img-tag", SignatureFamily::Script, r"<\s*img\b", Severity::Medium, "Raw <img> tag"),
];

static BUILTIN_SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    BUILTIN
        .iter()
        .filter_map(|(id, family, pattern, severity, _)| {
            compile(id, *family, pattern, *severity)
                .map_err(|e| log::error!("Built-in signature rejected: {}", e))
                .ok()
        })
        .collect()
});

fn compile(id: &str, family: SignatureFamily, pattern: &str, severity: Severity) -> Result<Signature, DetectorError> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| DetectorError::InvalidPattern {
            id: id.to_string(),
            source,
        })?;
    Ok(Signature {
        id: id.to_string(),
        family,
        severity,
        regex,
    })
}

/// Stateless signature scanner
#[derive(Debug, Clone)]
pub struct PatternDetector {
    signatures: Vec<Signature>,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self {
            signatures: BUILTIN_SIGNATURES.clone(),
        }
    }
}

impl PatternDetector {
    /// Built-in table plus `extra` signatures
    pub fn with_extra(extra: &[SignatureSpec]) -> Result<Self, DetectorError> {
        let mut detector = Self::default();
        for row in extra {
            if detector.signatures.iter().any(|s| s.id == row.id) {
                return Err(DetectorError::DuplicateId(row.id.clone()));
            }
            detector
                .signatures
                .push(compile(&row.id, row.family, &row.pattern, row.severity)?);
        }
        Ok(detector)
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Scan every field against every signature and return all hits, in field
    /// order then table order.
    pub fn scan<'a, I>(&self, fields: I) -> Vec<Match>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut matches = Vec::new();
        for (field, value) in fields {
            for signature in &self.signatures {
                for hit in signature.regex.find_iter(value) {
                    matches.push(Match {
                        field: field.to_string(),
                        signature: signature.id.clone(),
                        family: signature.family,
                        severity: signature.severity,
                        fragment: hit.as_str().to_string(),
                    });
                }
            }
        }
        matches
    }
}
