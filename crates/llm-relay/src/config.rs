//! Settings-driven provider construction.
//!
//! Hosts describe their providers as data ([`RelaySettings`], typically
//! deserialized from whatever config source the host uses) and hand the
//! manager a [`ProviderFactory`] per backend family. There is no global
//! factory registry: factories are injected at manager construction, so
//! two managers in one process can carry different adapter sets.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::provider::DynProvider;

/// Declarative description of one provider registration.
///
/// `Clone + PartialEq` so settings reloads can detect unchanged entries
/// and skip rebuilding them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Registration id, unique within the settings.
    pub id: String,
    /// Human-readable display name.
    #[serde(default)]
    pub name: String,
    /// Backend family the entry belongs to, matched against
    /// [`ProviderFactory::family`] (e.g. `"ollama"`, `"openai"`).
    pub family: String,
    /// Model identifier passed to the adapter.
    pub model: String,
    /// Base URL override; each family has its own default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key for authenticated backends.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Default-provider selection priority; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Whether this entry asks to be the default provider.
    #[serde(default)]
    pub default: bool,
    /// Whether this registration answers from the offline cache.
    #[serde(default)]
    pub offline: bool,
}

impl ProviderSettings {
    /// A minimal entry for the given id, family, and model.
    pub fn new(
        id: impl Into<String>,
        family: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            family: family.into(),
            model: model.into(),
            base_url: None,
            api_key: None,
            timeout_ms: None,
            priority: 0,
            default: false,
            offline: false,
        }
    }

    /// The per-request timeout as a `Duration`, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("family", &self.family)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_ms", &self.timeout_ms)
            .field("priority", &self.priority)
            .field("default", &self.default)
            .field("offline", &self.offline)
            .finish()
    }
}

/// The full provider section of a host's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Provider entries, one registration each.
    #[serde(default)]
    pub providers: Vec<ProviderSettings>,
}

impl RelaySettings {
    /// Looks up an entry by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }
}

/// Builds adapters for one backend family from settings entries.
///
/// Adapter crates each ship an implementation; the manager routes every
/// settings entry to the factory whose [`family`](Self::family) matches
/// the entry's `family` field (case-insensitive).
pub trait ProviderFactory: Send + Sync {
    /// Lowercase family identifier this factory handles.
    fn family(&self) -> &str;

    /// Creates an adapter from one settings entry.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the entry is missing
    /// or misusing fields this family requires.
    fn build(&self, settings: &ProviderSettings) -> Result<Arc<dyn DynProvider>, RelayError>;
}
