//! Account collaborator: registration and credential checks.
//!
//! The security core only talks to [`Authenticator`]. [`AccountDirectory`]
//! is the in-memory implementation the service runs with; it keeps a salted
//! SHA-256 digest of each password, never the password itself.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use sha2::{Digest, Sha256};

/// Result of a credential check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success { account: String },
    Failure,
}

/// Result of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    /// Check `password` for the account identified by `email`
    fn authenticate(&self, email: &str, password: &str) -> AuthOutcome;

    /// Create an account; existing emails are refused
    fn register(&self, username: &str, email: &str, password: &str) -> Registration;
}

struct AccountRecord {
    username: String,
    password_digest: String,
}

#[derive(Default)]
pub struct AccountDirectory {
    accounts: RwLock<HashMap<String, AccountRecord>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, AccountRecord>> {
        self.accounts.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Authenticator for AccountDirectory {
    fn authenticate(&self, email: &str, password: &str) -> AuthOutcome {
        let email = normalize_email(email);
        let accounts = self.read();
        match accounts.get(&email) {
            Some(record) if record.password_digest == digest(&email, password) => AuthOutcome::Success {
                account: record.username.clone(),
            },
            _ => AuthOutcome::Failure,
        }
    }

    fn register(&self, username: &str, email: &str, password: &str) -> Registration {
        let email = normalize_email(email);
        let mut accounts = self.write();
        if accounts.contains_key(&email) {
            return Registration::AlreadyExists;
        }
        let password_digest = digest(&email, password);
        accounts.insert(
            email,
            AccountRecord {
                username: username.to_string(),
                password_digest,
            },
        );
        Registration::Created
    }
}
