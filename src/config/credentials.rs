//! Credential Resolution
//!
//! Providers name a lookup key; a `CredentialSource` turns it into a secret.

use std::collections::HashMap;

/// Resolves a credential lookup key to a secret
pub trait CredentialSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads credentials from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// In-memory credentials
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticCredentials {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Collect every key for a provider: the primary one, then any extra
/// comma-separated keys, without duplicates. Extra keys are ignored when
/// the primary key is absent.
pub fn resolve_keys(source: &dyn CredentialSource, primary: &str, additional: &str) -> Vec<String> {
    let Some(primary_key) = source.get(primary) else {
        return Vec::new();
    };
    let mut keys = vec![primary_key];

    if let Some(extra) = source.get(additional) {
        for key in extra.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }

    keys
}
