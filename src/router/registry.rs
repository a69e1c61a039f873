//! Provider Registry
//!
//! Load-time view of every configured provider: its descriptor, resolved
//! keys and adapter. Immutable once built.

use crate::client::ProviderAdapter;
use crate::config::credentials::resolve_keys;
use crate::config::{CredentialSource, ProviderDescriptor, ProviderId};
use crate::router::key_pool::KeyPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One configured provider
pub struct ProviderEntry {
    pub descriptor: ProviderDescriptor,
    pub keys: KeyPool,
    pub adapter: Option<Arc<dyn ProviderAdapter>>,
}

impl ProviderEntry {
    pub fn has_credential(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Enabled, credentialed, and backed by an adapter
    pub fn is_available(&self) -> bool {
        self.descriptor.enabled && self.has_credential() && self.adapter.is_some()
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("descriptor", &self.descriptor)
            .field("keys", &self.keys.len())
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<ProviderId, ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new(
        descriptors: BTreeMap<ProviderId, ProviderDescriptor>,
        credentials: &dyn CredentialSource,
        mut adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|(id, descriptor)| {
                let keys = resolve_keys(
                    credentials,
                    &descriptor.api_key_env,
                    &descriptor.additional_keys_env(),
                );
                let entry = ProviderEntry {
                    keys: KeyPool::new(keys),
                    adapter: adapters.remove(&id),
                    descriptor,
                };

                if entry.is_available() {
                    tracing::info!(
                        provider = %id,
                        keys = entry.keys.len(),
                        priority = entry.descriptor.priority,
                        "initialized provider"
                    );
                } else {
                    tracing::debug!(
                        provider = %id,
                        enabled = entry.descriptor.enabled,
                        credential = entry.has_credential(),
                        adapter = entry.adapter.is_some(),
                        "provider not available"
                    );
                }

                (id, entry)
            })
            .collect();

        for id in adapters.keys() {
            tracing::warn!(provider = %id, "adapter registered for unconfigured provider");
        }

        Self { entries }
    }

    pub fn get(&self, id: ProviderId) -> Option<&ProviderEntry> {
        self.entries.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProviderId, &ProviderEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn is_available(&self, id: ProviderId) -> bool {
        self.get(id).is_some_and(ProviderEntry::is_available)
    }

    /// Available providers accepted by `is_healthy`, ascending by priority.
    /// Ties keep provider id order so the result is deterministic.
    pub fn available_providers(&self, is_healthy: impl Fn(ProviderId) -> bool) -> Vec<ProviderId> {
        let mut available: Vec<_> = self
            .iter()
            .filter(|(id, entry)| entry.is_available() && is_healthy(*id))
            .map(|(id, entry)| (entry.descriptor.priority, id))
            .collect();
        available.sort();
        available.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AdapterRequest, AdapterResponse};
    use crate::config::StaticCredentials;
    use crate::error::ProviderError;

    struct Echo;

    #[async_trait::async_trait]
    impl ProviderAdapter for Echo {
        async fn call(&self, request: &AdapterRequest) -> Result<AdapterResponse, ProviderError> {
            Ok(AdapterResponse {
                text: request.prompt.clone(),
                model: "echo".to_string(),
                tokens_used: 1,
            })
        }
    }

    fn descriptor(key: &str, priority: u32) -> ProviderDescriptor {
        ProviderDescriptor {
            priority,
            ..ProviderDescriptor::new(key)
        }
    }

    fn registry(descriptors: Vec<(ProviderId, ProviderDescriptor)>, creds: StaticCredentials) -> ProviderRegistry {
        let adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = descriptors
            .iter()
            .map(|(id, _)| (*id, Arc::new(Echo) as Arc<dyn ProviderAdapter>))
            .collect();
        ProviderRegistry::new(descriptors.into_iter().collect(), &creds, adapters)
    }

    #[test]
    fn test_ordering_by_priority() {
        let creds: StaticCredentials = [("A", "a"), ("B", "b"), ("C", "c")].into_iter().collect();
        let registry = registry(
            vec![
                (ProviderId::Gemini, descriptor("A", 3)),
                (ProviderId::OpenAi, descriptor("B", 1)),
                (ProviderId::Anthropic, descriptor("C", 2)),
            ],
            creds,
        );

        assert_eq!(
            registry.available_providers(|_| true),
            vec![ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Gemini]
        );
        assert_eq!(
            registry.available_providers(|id| id != ProviderId::Anthropic),
            vec![ProviderId::OpenAi, ProviderId::Gemini]
        );
    }

    #[test]
    fn test_priority_ties_are_deterministic() {
        let creds: StaticCredentials = [("A", "a"), ("B", "b")].into_iter().collect();
        let registry = registry(
            vec![
                (ProviderId::OpenAi, descriptor("B", 1)),
                (ProviderId::Gemini, descriptor("A", 1)),
            ],
            creds,
        );

        assert_eq!(
            registry.available_providers(|_| true),
            vec![ProviderId::Gemini, ProviderId::OpenAi]
        );
    }

    #[test]
    fn test_unavailable_providers_are_filtered() {
        let creds = StaticCredentials::new().with("A", "a").with("B", "b");
        let disabled = ProviderDescriptor {
            enabled: false,
            ..descriptor("B", 1)
        };
        let registry = registry(
            vec![
                (ProviderId::Gemini, descriptor("A", 2)),
                (ProviderId::OpenAi, disabled),
                (ProviderId::Anthropic, descriptor("NO_SUCH_KEY", 0)),
            ],
            creds,
        );

        assert_eq!(registry.available_providers(|_| true), vec![ProviderId::Gemini]);
        assert!(!registry.is_available(ProviderId::Anthropic));
        assert!(!registry.get(ProviderId::Anthropic).unwrap().has_credential());
    }

    #[test]
    fn test_provider_without_adapter_is_unavailable() {
        let creds = StaticCredentials::new().with("A", "a");
        let registry = ProviderRegistry::new(
            [(ProviderId::Gemini, descriptor("A", 1))].into_iter().collect(),
            &creds,
            HashMap::new(),
        );

        assert!(registry.available_providers(|_| true).is_empty());
        assert!(registry.get(ProviderId::Gemini).unwrap().has_credential());
    }
}
