//! Configuration Module
//!
//! Provider descriptors, router settings, config loading and credentials.

pub mod credentials;
pub mod loader;
pub mod provider;

pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use loader::ConfigLoader;
pub use provider::{
    CacheSettings, ProviderDescriptor, ProviderId, RouterConfig, RoutingSettings,
    UserLimitSettings,
};
