//! Provider registration, default selection, and request dispatch.
//!
//! [`ProviderManager`] is the orchestration root: it owns the set of
//! registered adapters, tracks which one is the default, and drives
//! every request through its lifecycle. Managers are explicitly
//! constructed and passed around — there is no global instance, so a
//! process can run several isolated managers (one per tenant, one per
//! test) without interference.
//!
//! # Default selection
//!
//! At most one registration is the default at any time. The first
//! registration becomes the default; `is_default` on a later one is
//! honored only while no default exists, so an established default can
//! only be displaced through
//! [`set_default_provider`](ProviderManager::set_default_provider).
//! When the default is unregistered the highest-`priority` survivor
//! inherits the flag, ties broken by registration order (earliest
//! wins).
//!
//! # Dispatch
//!
//! `dispatch` runs: validate → resolve default → request `Pending` →
//! offline cache hit short-circuits to `Completed` (zero network);
//! otherwise `InProgress` → availability probe → adapter call under the
//! request timeout → `Completed` (cache updated, so later offline runs
//! can replay it) or `Failed`. Cancellation is cooperative and wins
//! over late results.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::cache::{MemoryCache, ResponseCache};
use crate::config::{ProviderFactory, ProviderSettings, RelaySettings};
use crate::error::RelayError;
use crate::event::{RegistryEvent, RelayObserver};
use crate::provider::{Completion, CompletionParams, DynProvider};
use crate::request::{RequestError, RequestHandle};
use crate::stream::StreamEvent;

/// Where a registration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationSource {
    /// Registered through [`ProviderManager::register_provider`].
    Manual,
    /// Derived from [`RelaySettings`] by
    /// [`ProviderManager::load_provider_settings`].
    Settings,
}

/// Options for [`ProviderManager::register_provider`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterOptions {
    /// Become the default, honored only while no default exists.
    pub is_default: bool,
    /// Default-selection priority; higher wins when the default must be
    /// recomputed.
    pub priority: i32,
    /// Answer from the offline cache instead of the network.
    pub offline: bool,
}

/// A snapshot view of one registered provider.
#[derive(Clone)]
pub struct Registration {
    /// Unique registration id.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// The adapter serving this registration.
    pub adapter: Arc<dyn DynProvider>,
    /// Whether this registration currently holds the default flag.
    pub is_default: bool,
    /// Default-selection priority.
    pub priority: i32,
    /// Whether requests answer from the offline cache.
    pub offline: bool,
    /// Registration sequence number; lower registered earlier.
    pub order: u64,
    /// Provenance of the registration.
    pub source: RegistrationSource,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .field("priority", &self.priority)
            .field("offline", &self.offline)
            .field("order", &self.order)
            .field("source", &self.source)
            .finish()
    }
}

struct Entry {
    name: String,
    adapter: Arc<dyn DynProvider>,
    priority: i32,
    offline: bool,
    order: u64,
    source: RegistrationSource,
    /// The settings value this entry was built from, for change
    /// detection on reload. `None` for manual registrations.
    settings: Option<ProviderSettings>,
}

/// The registration set and default pointer, mutated atomically under
/// one write lock so the one-default invariant holds at every point an
/// observer can see.
#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    default_id: Option<String>,
    next_order: u64,
}

impl Registry {
    fn insert(
        &mut self,
        id: &str,
        name: String,
        adapter: Arc<dyn DynProvider>,
        options: RegisterOptions,
        source: RegistrationSource,
        settings: Option<ProviderSettings>,
        events: &mut Vec<RegistryEvent>,
    ) -> bool {
        if self.entries.contains_key(id) {
            return false;
        }
        let order = self.next_order;
        self.next_order += 1;
        self.entries.insert(
            id.to_owned(),
            Entry {
                name,
                adapter,
                priority: options.priority,
                offline: options.offline,
                order,
                source,
                settings,
            },
        );
        events.push(RegistryEvent::ProviderRegistered { id: id.to_owned() });
        // Registration never displaces an existing default; that is
        // what set_default is for.
        if self.default_id.is_none() {
            self.change_default(Some(id.to_owned()), events);
        }
        true
    }

    fn remove(&mut self, id: &str, events: &mut Vec<RegistryEvent>) -> bool {
        if self.entries.remove(id).is_none() {
            return false;
        }
        events.push(RegistryEvent::ProviderUnregistered { id: id.to_owned() });
        if self.default_id.as_deref() == Some(id) {
            let successor = self.best_candidate();
            self.change_default(successor, events);
        }
        true
    }

    fn set_default(&mut self, id: &str, events: &mut Vec<RegistryEvent>) -> bool {
        if !self.entries.contains_key(id) {
            return false;
        }
        if self.default_id.as_deref() != Some(id) {
            self.change_default(Some(id.to_owned()), events);
        }
        true
    }

    fn change_default(&mut self, id: Option<String>, events: &mut Vec<RegistryEvent>) {
        if self.default_id != id {
            self.default_id = id.clone();
            events.push(RegistryEvent::DefaultProviderChanged { id });
        }
    }

    /// Highest priority wins; ties go to the earliest registration.
    fn best_candidate(&self) -> Option<String> {
        self.entries
            .iter()
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.order)))
            .map(|(id, _)| id.clone())
    }

    fn view(&self, id: &str) -> Option<Registration> {
        self.entries.get(id).map(|e| Registration {
            id: id.to_owned(),
            name: e.name.clone(),
            adapter: Arc::clone(&e.adapter),
            is_default: self.default_id.as_deref() == Some(id),
            priority: e.priority,
            offline: e.offline,
            order: e.order,
            source: e.source,
        })
    }
}

/// Builder for [`ProviderManager`].
#[derive(Default)]
pub struct ProviderManagerBuilder {
    observers: Vec<Arc<dyn RelayObserver>>,
    cache: Option<Arc<dyn ResponseCache>>,
    factories: Vec<Arc<dyn ProviderFactory>>,
}

impl ProviderManagerBuilder {
    /// Adds an observer; invoked in the order added.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn RelayObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Replaces the default in-memory offline cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Adds a factory used by
    /// [`load_provider_settings`](ProviderManager::load_provider_settings)
    /// for its backend family.
    #[must_use]
    pub fn factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> ProviderManager {
        let factories = self
            .factories
            .into_iter()
            .map(|f| (f.family().to_lowercase(), f))
            .collect();
        ProviderManager {
            inner: RwLock::new(Registry::default()),
            observers: Arc::from(self.observers),
            cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
            factories,
        }
    }
}

/// Orchestration root: provider registry, default selection, dispatch.
pub struct ProviderManager {
    inner: RwLock<Registry>,
    observers: Arc<[Arc<dyn RelayObserver>]>,
    cache: Arc<dyn ResponseCache>,
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl fmt::Debug for ProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.read().expect("provider registry lock poisoned");
        let ids: Vec<_> = registry.entries.keys().collect();
        f.debug_struct("ProviderManager")
            .field("providers", &ids)
            .field("default", &registry.default_id)
            .finish()
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProviderManager {
    /// Starts building a manager.
    pub fn builder() -> ProviderManagerBuilder {
        ProviderManagerBuilder::default()
    }

    // --- registry operations ---

    /// Registers an adapter under `id`.
    ///
    /// Returns `false` (and mutates nothing) when the id is taken. The
    /// first registration becomes the default; `options.is_default` is
    /// honored only while no default exists. Use
    /// [`set_default_provider`](Self::set_default_provider) to move an
    /// established flag.
    pub fn register_provider(
        &self,
        id: &str,
        name: &str,
        adapter: Arc<dyn DynProvider>,
        options: RegisterOptions,
    ) -> bool {
        let mut events = Vec::new();
        let inserted = {
            let mut registry = self.inner.write().expect("provider registry lock poisoned");
            registry.insert(
                id,
                name.to_owned(),
                adapter,
                options,
                RegistrationSource::Manual,
                None,
                &mut events,
            )
        };
        if inserted {
            tracing::debug!(provider = id, priority = options.priority, "provider registered");
        }
        self.emit(&events);
        inserted
    }

    /// Removes a registration. Returns `false` when the id is unknown.
    ///
    /// If the default was removed, the highest-priority survivor (ties
    /// to the earliest registration) inherits the flag.
    pub fn unregister_provider(&self, id: &str) -> bool {
        let mut events = Vec::new();
        let removed = {
            let mut registry = self.inner.write().expect("provider registry lock poisoned");
            registry.remove(id, &mut events)
        };
        if removed {
            tracing::debug!(provider = id, "provider unregistered");
        }
        self.emit(&events);
        removed
    }

    /// Moves the default flag to `id`. Returns `false` when the id is
    /// unknown.
    ///
    /// After the flag moves, the new default is probed for availability
    /// as a best-effort check; a failed probe logs a warning but never
    /// undoes the change.
    pub async fn set_default_provider(&self, id: &str) -> bool {
        let mut events = Vec::new();
        let adapter = {
            let mut registry = self.inner.write().expect("provider registry lock poisoned");
            if !registry.set_default(id, &mut events) {
                return false;
            }
            registry.entries.get(id).map(|e| Arc::clone(&e.adapter))
        };
        self.emit(&events);

        if let Some(adapter) = adapter {
            if !adapter.is_available_boxed().await {
                tracing::warn!(provider = id, "new default provider failed availability probe");
            }
        }
        true
    }

    /// Flips a registration's offline mode. Returns `false` when the id
    /// is unknown.
    pub fn set_offline_mode(&self, id: &str, offline: bool) -> bool {
        let mut registry = self.inner.write().expect("provider registry lock poisoned");
        match registry.entries.get_mut(id) {
            Some(entry) => {
                entry.offline = offline;
                true
            }
            None => false,
        }
    }

    /// Looks up a registration by id.
    pub fn provider(&self, id: &str) -> Option<Registration> {
        let registry = self.inner.read().expect("provider registry lock poisoned");
        registry.view(id)
    }

    /// All registrations, in registration order.
    pub fn providers(&self) -> Vec<Registration> {
        let registry = self.inner.read().expect("provider registry lock poisoned");
        let mut views: Vec<_> = registry
            .entries
            .keys()
            .filter_map(|id| registry.view(id))
            .collect();
        views.sort_by_key(|r| r.order);
        views
    }

    /// The current default registration, if any.
    pub fn default_provider(&self) -> Option<Registration> {
        let registry = self.inner.read().expect("provider registry lock poisoned");
        registry
            .default_id
            .clone()
            .and_then(|id| registry.view(&id))
    }

    // --- settings ---

    /// Reconciles the Settings-sourced registrations against `settings`.
    ///
    /// Unchanged entries are left alone (an identical settings value is
    /// a no-op producing no events), changed entries are rebuilt through
    /// the matching [`ProviderFactory`], removed entries are
    /// unregistered. Manual registrations are never touched; a settings
    /// entry whose id collides with one is skipped with a warning.
    pub fn load_provider_settings(&self, settings: &RelaySettings) -> Vec<RegistryEvent> {
        let mut events = Vec::new();
        {
            let mut registry = self.inner.write().expect("provider registry lock poisoned");

            let stale: Vec<String> = registry
                .entries
                .iter()
                .filter(|(id, e)| {
                    e.source == RegistrationSource::Settings
                        && !settings.providers.iter().any(|p| p.id == **id)
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                registry.remove(&id, &mut events);
            }

            for entry in &settings.providers {
                match registry.entries.get(&entry.id) {
                    Some(existing) if existing.source == RegistrationSource::Manual => {
                        tracing::warn!(
                            provider = %entry.id,
                            "settings entry collides with a manual registration; skipping"
                        );
                        continue;
                    }
                    Some(existing) if existing.settings.as_ref() == Some(entry) => continue,
                    _ => {}
                }

                let Some(factory) = self.factories.get(&entry.family.to_lowercase()) else {
                    tracing::warn!(
                        provider = %entry.id,
                        family = %entry.family,
                        "no factory registered for provider family; skipping"
                    );
                    continue;
                };
                let adapter = match factory.build(entry) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        tracing::warn!(
                            provider = %entry.id,
                            error = %e,
                            "failed to build provider from settings; skipping"
                        );
                        continue;
                    }
                };

                registry.remove(&entry.id, &mut events);
                let name = if entry.name.is_empty() {
                    entry.id.clone()
                } else {
                    entry.name.clone()
                };
                registry.insert(
                    &entry.id,
                    name,
                    adapter,
                    RegisterOptions {
                        priority: entry.priority,
                        offline: entry.offline,
                        ..Default::default()
                    },
                    RegistrationSource::Settings,
                    Some(entry.clone()),
                    &mut events,
                );
                // The settings file names its default outright, which
                // may displace one inherited during the rebuild.
                if entry.default {
                    registry.set_default(&entry.id, &mut events);
                }
            }
        }
        self.emit(&events);
        events
    }

    // --- dispatch ---

    /// Sends a prompt through the default provider and returns the
    /// response text. `options.prompt` is replaced by `prompt`.
    pub async fn send_prompt(
        &self,
        prompt: impl Into<String>,
        options: CompletionParams,
    ) -> Result<String, RelayError> {
        let params = CompletionParams {
            prompt: prompt.into(),
            ..options
        };
        self.dispatch(&params).await.map(|c| c.content)
    }

    /// Like [`send_prompt`](Self::send_prompt), with a system-prompt
    /// directive asking for the response in `language`. The prompt
    /// itself is untouched, so the offline cache key is unaffected.
    pub async fn send_prompt_with_language(
        &self,
        prompt: impl Into<String>,
        language: &str,
        options: CompletionParams,
    ) -> Result<String, RelayError> {
        let directive = format!("Respond in {language}.");
        let system = match options.system {
            Some(existing) => format!("{existing}\n{directive}"),
            None => directive,
        };
        let params = CompletionParams {
            prompt: prompt.into(),
            system: Some(system),
            ..options
        };
        self.dispatch(&params).await.map(|c| c.content)
    }

    /// Streams a prompt through the default provider, invoking
    /// `on_chunk` for every event in delivery order, and returns the
    /// full aggregated text.
    ///
    /// Fails up-front with [`RelayError::InvalidRequest`] when the
    /// default provider does not support streaming.
    pub async fn send_streaming_prompt<F>(
        &self,
        prompt: impl Into<String>,
        options: CompletionParams,
        on_chunk: F,
    ) -> Result<String, RelayError>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        let params = CompletionParams {
            prompt: prompt.into(),
            ..options
        };
        let handle = self.create_request(&params)?;
        self.run_streaming(&handle, &params, on_chunk).await
    }

    /// Full dispatch: creates the request and runs it to a terminal
    /// state, returning the completion.
    pub async fn dispatch(&self, params: &CompletionParams) -> Result<Completion, RelayError> {
        let handle = self.create_request(params)?;
        self.run_request(&handle, params).await
    }

    /// Validates `params` and creates a `Pending` request against the
    /// current default provider. Use the returned handle to cancel or
    /// observe the request while [`run_request`](Self::run_request)
    /// drives it.
    pub fn create_request(&self, params: &CompletionParams) -> Result<RequestHandle, RelayError> {
        params.validate()?;
        let registration = self.default_provider().ok_or(RelayError::NoActiveProvider)?;
        let model = params
            .model
            .clone()
            .unwrap_or_else(|| registration.adapter.capabilities().model);
        Ok(RequestHandle::create(
            Arc::clone(&self.observers),
            &params.prompt,
            &model,
            params.priority,
        ))
    }

    /// Drives a created request to a terminal state.
    #[tracing::instrument(skip_all, fields(request_id = %handle.id()))]
    pub async fn run_request(
        &self,
        handle: &RequestHandle,
        params: &CompletionParams,
    ) -> Result<Completion, RelayError> {
        let Some(registration) = self.default_provider() else {
            // The default disappeared between creation and dispatch.
            handle.start();
            let err = RelayError::NoActiveProvider;
            handle.fail(RequestError::from(&err));
            return Err(err);
        };

        if registration.offline {
            if let Some(outcome) = self.replay_cached(handle, &registration, params) {
                return outcome;
            }
            // Miss: fall through to a live call, which warms the cache
            // for later offline runs.
        }

        if !handle.start() {
            return Err(RelayError::Cancelled);
        }

        let available = tokio::select! {
            available = registration.adapter.is_available_boxed() => available,
            () = handle.cancelled() => return Err(RelayError::Cancelled),
        };
        if !available {
            let err = RelayError::Unavailable {
                provider: registration.id.clone(),
            };
            handle.fail(RequestError::from(&err));
            return Err(err);
        }

        let outcome = tokio::select! {
            result = with_timeout(
                params.timeout,
                registration.adapter.generate_boxed(params),
            ) => result,
            () = handle.cancelled() => return Err(RelayError::Cancelled),
        };

        match outcome {
            Ok(mut completion) => {
                self.cache.set(&params.prompt, &completion.content);
                completion.request_id = Some(handle.id());
                if handle.complete() {
                    Ok(completion)
                } else {
                    // Cancelled while the result was in flight.
                    Err(RelayError::Cancelled)
                }
            }
            Err(err) => {
                handle.fail(RequestError::from(&err));
                Err(err)
            }
        }
    }

    /// Replays a cached response for an offline registration, never
    /// touching the adapter. `None` on a cache miss; the caller falls
    /// back to a live call.
    fn replay_cached(
        &self,
        handle: &RequestHandle,
        registration: &Registration,
        params: &CompletionParams,
    ) -> Option<Result<Completion, RelayError>> {
        let content = self.cache.get(&params.prompt)?;
        let mut completion = Completion::new(
            content,
            registration.adapter.capabilities().model,
            params.prompt.clone(),
        );
        completion.request_id = Some(handle.id());
        Some(if handle.complete() {
            Ok(completion)
        } else {
            Err(RelayError::Cancelled)
        })
    }

    #[tracing::instrument(skip_all, fields(request_id = %handle.id()))]
    async fn run_streaming<F>(
        &self,
        handle: &RequestHandle,
        params: &CompletionParams,
        mut on_chunk: F,
    ) -> Result<String, RelayError>
    where
        F: FnMut(&StreamEvent) + Send,
    {
        use futures::StreamExt;

        let Some(registration) = self.default_provider() else {
            handle.start();
            let err = RelayError::NoActiveProvider;
            handle.fail(RequestError::from(&err));
            return Err(err);
        };

        if registration.offline {
            if let Some(content) = self.cache.get(&params.prompt) {
                let event = StreamEvent::complete(content.clone(), None);
                on_chunk(&event);
                return if handle.complete() {
                    Ok(content)
                } else {
                    Err(RelayError::Cancelled)
                };
            }
            // Miss: fall through to a live stream, which warms the
            // cache for later offline runs.
        }

        if !registration.adapter.capabilities().supports_streaming() {
            handle.start();
            let err = RelayError::InvalidRequest(format!(
                "provider '{}' does not support streaming",
                registration.id
            ));
            handle.fail(RequestError::from(&err));
            return Err(err);
        }

        if !handle.start() {
            return Err(RelayError::Cancelled);
        }

        let available = tokio::select! {
            available = registration.adapter.is_available_boxed() => available,
            () = handle.cancelled() => return Err(RelayError::Cancelled),
        };
        if !available {
            let err = RelayError::Unavailable {
                provider: registration.id.clone(),
            };
            handle.fail(RequestError::from(&err));
            return Err(err);
        }

        let consume = async {
            let mut stream = registration.adapter.stream_boxed(params).await?;
            let mut aggregate = String::new();
            let mut final_content = None;
            while let Some(item) = stream.next().await {
                let event = item?;
                if event.is_complete {
                    on_chunk(&event);
                    final_content = Some(event.content);
                    break;
                }
                aggregate.push_str(&event.content);
                handle.progress();
                on_chunk(&event);
            }
            Ok::<String, RelayError>(final_content.unwrap_or(aggregate))
        };

        let outcome = tokio::select! {
            result = with_timeout(params.timeout, consume) => result,
            () = handle.cancelled() => return Err(RelayError::Cancelled),
        };

        match outcome {
            Ok(content) => {
                self.cache.set(&params.prompt, &content);
                if handle.complete() {
                    Ok(content)
                } else {
                    Err(RelayError::Cancelled)
                }
            }
            Err(err) => {
                handle.fail(RequestError::from(&err));
                Err(err)
            }
        }
    }

    fn emit(&self, events: &[RegistryEvent]) {
        for event in events {
            for observer in self.observers.iter() {
                observer.on_registry_event(event);
            }
        }
    }
}

/// Wraps `fut` in `tokio::time::timeout` when a limit is set.
async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{LifecycleEvent, LifecycleEventKind};
    use crate::mock::{MockError, MockProvider};
    use crate::request::{ErrorCode, RequestStatus};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Sink {
        registry: Mutex<Vec<RegistryEvent>>,
        lifecycle: Mutex<Vec<LifecycleEventKind>>,
    }

    impl RelayObserver for Sink {
        fn on_registry_event(&self, event: &RegistryEvent) {
            self.registry.lock().unwrap().push(event.clone());
        }
        fn on_lifecycle_event(&self, event: &LifecycleEvent) {
            self.lifecycle.lock().unwrap().push(event.kind);
        }
    }

    fn observed_manager() -> (ProviderManager, Arc<Sink>) {
        let sink = Arc::new(Sink::default());
        let manager = ProviderManager::builder()
            .observer(sink.clone() as Arc<dyn RelayObserver>)
            .build();
        (manager, sink)
    }

    fn mock_adapter(model: &str) -> Arc<dyn DynProvider> {
        Arc::new(MockProvider::new(model))
    }

    // --- registry ---

    #[test]
    fn test_first_registration_becomes_default() {
        let (manager, sink) = observed_manager();
        assert!(manager.register_provider(
            "a",
            "A",
            mock_adapter("m"),
            RegisterOptions::default()
        ));
        let default = manager.default_provider().unwrap();
        assert_eq!(default.id, "a");
        assert!(default.is_default);
        assert_eq!(
            *sink.registry.lock().unwrap(),
            vec![
                RegistryEvent::ProviderRegistered { id: "a".into() },
                RegistryEvent::DefaultProviderChanged {
                    id: Some("a".into())
                },
            ]
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (manager, sink) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        sink.registry.lock().unwrap().clear();

        assert!(!manager.register_provider(
            "a",
            "A again",
            mock_adapter("other"),
            RegisterOptions::default()
        ));
        assert!(sink.registry.lock().unwrap().is_empty());
        assert_eq!(manager.provider("a").unwrap().name, "A");
    }

    #[test]
    fn test_register_is_default_never_steals_existing() {
        let (manager, sink) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        sink.registry.lock().unwrap().clear();

        manager.register_provider(
            "b",
            "B",
            mock_adapter("m"),
            RegisterOptions {
                is_default: true,
                ..Default::default()
            },
        );
        // "a" keeps the flag; only set_default_provider moves it.
        assert_eq!(manager.default_provider().unwrap().id, "a");
        assert!(!manager.provider("b").unwrap().is_default);
        assert_eq!(
            *sink.registry.lock().unwrap(),
            vec![RegistryEvent::ProviderRegistered { id: "b".into() }]
        );
    }

    #[test]
    fn test_unregister_recomputes_default_by_priority() {
        let (manager, _) = observed_manager();
        manager.register_provider("low", "L", mock_adapter("m"), RegisterOptions::default());
        manager.register_provider(
            "high",
            "H",
            mock_adapter("m"),
            RegisterOptions {
                priority: 5,
                ..Default::default()
            },
        );
        manager.register_provider(
            "mid",
            "M",
            mock_adapter("m"),
            RegisterOptions {
                priority: 3,
                ..Default::default()
            },
        );

        assert_eq!(manager.default_provider().unwrap().id, "low");
        assert!(manager.unregister_provider("low"));
        assert_eq!(manager.default_provider().unwrap().id, "high");
    }

    #[test]
    fn test_priority_tie_breaks_to_earliest() {
        let (manager, _) = observed_manager();
        manager.register_provider("first", "F", mock_adapter("m"), RegisterOptions::default());
        manager.register_provider(
            "second",
            "S",
            mock_adapter("m"),
            RegisterOptions {
                priority: 2,
                ..Default::default()
            },
        );
        manager.register_provider(
            "third",
            "T",
            mock_adapter("m"),
            RegisterOptions {
                priority: 2,
                ..Default::default()
            },
        );

        manager.unregister_provider("first");
        assert_eq!(manager.default_provider().unwrap().id, "second");
    }

    #[test]
    fn test_unregister_last_clears_default() {
        let (manager, sink) = observed_manager();
        manager.register_provider("only", "O", mock_adapter("m"), RegisterOptions::default());
        sink.registry.lock().unwrap().clear();

        assert!(manager.unregister_provider("only"));
        assert!(manager.default_provider().is_none());
        assert_eq!(
            *sink.registry.lock().unwrap(),
            vec![
                RegistryEvent::ProviderUnregistered { id: "only".into() },
                RegistryEvent::DefaultProviderChanged { id: None },
            ]
        );
    }

    #[test]
    fn test_unregister_unknown_is_false() {
        let (manager, sink) = observed_manager();
        assert!(!manager.unregister_provider("ghost"));
        assert!(sink.registry.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_default_provider() {
        let (manager, sink) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        manager.register_provider("b", "B", mock_adapter("m"), RegisterOptions::default());
        sink.registry.lock().unwrap().clear();

        assert!(manager.set_default_provider("b").await);
        assert_eq!(manager.default_provider().unwrap().id, "b");
        assert_eq!(
            *sink.registry.lock().unwrap(),
            vec![RegistryEvent::DefaultProviderChanged {
                id: Some("b".into())
            }]
        );

        // Unknown id refuses and emits nothing.
        sink.registry.lock().unwrap().clear();
        assert!(!manager.set_default_provider("ghost").await);
        assert!(sink.registry.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_default_already_default_no_event() {
        let (manager, sink) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        sink.registry.lock().unwrap().clear();

        assert!(manager.set_default_provider("a").await);
        assert!(sink.registry.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_default_survives_failed_probe() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.set_available(false);
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        manager.register_provider("down", "D", mock, RegisterOptions::default());

        // Probe fails but the flag still moves.
        assert!(manager.set_default_provider("down").await);
        assert_eq!(manager.default_provider().unwrap().id, "down");
    }

    #[test]
    fn test_providers_in_registration_order() {
        let (manager, _) = observed_manager();
        for id in ["c", "a", "b"] {
            manager.register_provider(id, id, mock_adapter("m"), RegisterOptions::default());
        }
        let ids: Vec<_> = manager.providers().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_set_offline_mode() {
        let (manager, _) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        assert!(manager.set_offline_mode("a", true));
        assert!(manager.provider("a").unwrap().offline);
        assert!(!manager.set_offline_mode("ghost", true));
    }

    // --- dispatch ---

    #[tokio::test]
    async fn test_dispatch_happy_path() {
        let (manager, sink) = observed_manager();
        let mock = Arc::new(MockProvider::new("test-model"));
        mock.queue_response("pong");
        manager.register_provider("a", "A", mock.clone(), RegisterOptions::default());

        let completion = manager
            .dispatch(&CompletionParams::new("ping"))
            .await
            .unwrap();
        assert_eq!(completion.content, "pong");
        assert!(completion.request_id.is_some());
        assert_eq!(
            *sink.lifecycle.lock().unwrap(),
            vec![
                LifecycleEventKind::Created,
                LifecycleEventKind::Started,
                LifecycleEventKind::Completed,
            ]
        );
        assert_eq!(mock.recorded_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_no_provider() {
        let (manager, _) = observed_manager();
        let err = manager
            .dispatch(&CompletionParams::new("ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NoActiveProvider));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_invalid_params() {
        let (manager, _) = observed_manager();
        manager.register_provider("a", "A", mock_adapter("m"), RegisterOptions::default());
        let err = manager
            .dispatch(&CompletionParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_dispatch_populates_cache() {
        let cache = Arc::new(MemoryCache::new());
        let manager = ProviderManager::builder()
            .cache(cache.clone() as Arc<dyn ResponseCache>)
            .build();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("answer");
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        manager
            .dispatch(&CompletionParams::new("question"))
            .await
            .unwrap();
        assert_eq!(cache.get("question").as_deref(), Some("answer"));
    }

    #[tokio::test]
    async fn test_dispatch_unavailable_provider_fails() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.set_available(false);
        manager.register_provider("down", "D", mock.clone(), RegisterOptions::default());

        let handle = manager
            .create_request(&CompletionParams::new("ping"))
            .unwrap();
        let err = manager
            .run_request(&handle, &CompletionParams::new("ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Unavailable { ref provider } if provider == "down"));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, RequestStatus::Failed);
        assert_eq!(
            snapshot.error.unwrap().code,
            ErrorCode::ProviderUnavailable
        );
        // Probe ran but generate never did.
        assert_eq!(mock.recorded_calls().len(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_adapter_error_fails_request() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_error(MockError::Http {
            status: Some(http::StatusCode::INTERNAL_SERVER_ERROR),
            message: "boom".into(),
            retryable: true,
        });
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        let params = CompletionParams::new("ping");
        let handle = manager.create_request(&params).unwrap();
        let err = manager.run_request(&handle, &params).await.unwrap_err();
        assert!(matches!(err, RelayError::Http { .. }));
        assert_eq!(
            handle.snapshot().error.unwrap().code,
            ErrorCode::Transport
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_timeout() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("too late");
        mock.set_delay(Duration::from_millis(500));
        manager.register_provider("slow", "S", mock, RegisterOptions::default());

        let params = CompletionParams {
            prompt: "ping".into(),
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let handle = manager.create_request(&params).unwrap();
        let err = manager.run_request(&handle, &params).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout { elapsed_ms: 50 }));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, RequestStatus::Failed);
        assert_eq!(snapshot.error.unwrap().code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_dispatch_cancellation() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("never seen");
        mock.set_delay(Duration::from_secs(60));
        manager.register_provider("slow", "S", mock, RegisterOptions::default());

        let params = CompletionParams::new("ping");
        let handle = manager.create_request(&params).unwrap();

        let canceller = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = manager.run_request(&handle, &params).await.unwrap_err();
        assert!(matches!(err, RelayError::Cancelled));
        assert_eq!(handle.status(), RequestStatus::Cancelled);
    }

    // --- offline cache ---

    #[tokio::test]
    async fn test_offline_cache_hit_zero_network() {
        let cache = Arc::new(MemoryCache::new());
        cache.set("ping", "pong");
        let sink = Arc::new(Sink::default());
        let manager = ProviderManager::builder()
            .observer(sink.clone() as Arc<dyn RelayObserver>)
            .cache(cache as Arc<dyn ResponseCache>)
            .build();

        let mock = Arc::new(MockProvider::new("m"));
        manager.register_provider(
            "replay",
            "R",
            mock.clone(),
            RegisterOptions {
                offline: true,
                ..Default::default()
            },
        );

        let params = CompletionParams::new("ping");
        let handle = manager.create_request(&params).unwrap();
        let completion = manager.run_request(&handle, &params).await.unwrap();
        assert_eq!(completion.content, "pong");
        assert_eq!(handle.status(), RequestStatus::Completed);
        // Pending went straight to Completed, no Started.
        assert_eq!(
            *sink.lifecycle.lock().unwrap(),
            vec![LifecycleEventKind::Created, LifecycleEventKind::Completed]
        );
        // No probe, no generate.
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_cache_miss_falls_back_to_live() {
        let cache = Arc::new(MemoryCache::new());
        let manager = ProviderManager::builder()
            .cache(cache.clone() as Arc<dyn ResponseCache>)
            .build();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("fresh answer");
        manager.register_provider(
            "replay",
            "R",
            mock.clone(),
            RegisterOptions {
                offline: true,
                ..Default::default()
            },
        );

        let params = CompletionParams::new("never cached");
        let handle = manager.create_request(&params).unwrap();
        let completion = manager.run_request(&handle, &params).await.unwrap();
        assert_eq!(completion.content, "fresh answer");
        assert_eq!(handle.status(), RequestStatus::Completed);
        assert_eq!(mock.call_count(), 1);
        // Written back so the next offline run can replay it.
        assert_eq!(cache.get("never cached").as_deref(), Some("fresh answer"));

        let replayed = manager
            .dispatch(&CompletionParams::new("never cached"))
            .await
            .unwrap();
        assert_eq!(replayed.content, "fresh answer");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_streaming_offline_miss_falls_back_to_live() {
        let cache = Arc::new(MemoryCache::new());
        let manager = ProviderManager::builder()
            .cache(cache.clone() as Arc<dyn ResponseCache>)
            .build();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_stream(vec![
            StreamEvent::delta("fre"),
            StreamEvent::delta("sh"),
            StreamEvent::complete("fresh", None),
        ]);
        manager.register_provider(
            "replay",
            "R",
            mock.clone(),
            RegisterOptions {
                offline: true,
                ..Default::default()
            },
        );

        let content = manager
            .send_streaming_prompt("q", CompletionParams::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(content, "fresh");
        assert_eq!(cache.get("q").as_deref(), Some("fresh"));

        // Replayed from the cache afterwards, no second stream.
        let replayed = manager
            .send_streaming_prompt("q", CompletionParams::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(replayed, "fresh");
        assert_eq!(mock.call_count(), 1);
    }

    // --- prompts ---

    #[tokio::test]
    async fn test_send_prompt() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("hello back");
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        let content = manager
            .send_prompt("hello", CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(content, "hello back");
    }

    #[tokio::test]
    async fn test_send_prompt_with_language_injects_system() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("hola");
        manager.register_provider("a", "A", mock.clone(), RegisterOptions::default());

        manager
            .send_prompt_with_language("greet me", "Spanish", CompletionParams::default())
            .await
            .unwrap();

        let calls = mock.recorded_calls();
        // Prompt untouched, directive in the system prompt.
        assert_eq!(calls[0].prompt, "greet me");
        assert!(calls[0].system.as_deref().unwrap().contains("Spanish"));
    }

    #[tokio::test]
    async fn test_send_prompt_with_language_appends_to_existing_system() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_response("ok");
        manager.register_provider("a", "A", mock.clone(), RegisterOptions::default());

        let options = CompletionParams {
            system: Some("be terse".into()),
            ..Default::default()
        };
        manager
            .send_prompt_with_language("x", "French", options)
            .await
            .unwrap();

        let system = mock.recorded_calls()[0].system.clone().unwrap();
        assert!(system.contains("be terse"));
        assert!(system.contains("French"));
    }

    // --- streaming ---

    #[tokio::test]
    async fn test_streaming_aggregation_matches_deltas() {
        let (manager, sink) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_stream(vec![
            StreamEvent::delta("Hi"),
            StreamEvent::delta(" there"),
            StreamEvent::complete("Hi there", Some(2)),
        ]);
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        let mut seen = Vec::new();
        let content = manager
            .send_streaming_prompt("greet", CompletionParams::default(), |event| {
                seen.push(event.clone());
            })
            .await
            .unwrap();

        assert_eq!(content, "Hi there");
        assert_eq!(seen.len(), 3);
        let concatenated: String = seen
            .iter()
            .filter(|e| !e.is_complete)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(concatenated, content);

        let lifecycle = sink.lifecycle.lock().unwrap();
        let progress = lifecycle
            .iter()
            .filter(|k| **k == LifecycleEventKind::Progress)
            .count();
        assert_eq!(progress, 2);
        assert_eq!(*lifecycle.last().unwrap(), LifecycleEventKind::Completed);
    }

    #[tokio::test]
    async fn test_streaming_rejected_without_capability() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m").without_streaming());
        manager.register_provider("plain", "P", mock.clone(), RegisterOptions::default());

        let err = manager
            .send_streaming_prompt("x", CompletionParams::default(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidRequest(_)));
        // Rejected before any adapter call.
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_streaming_without_terminal_event_uses_aggregate() {
        let (manager, _) = observed_manager();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_stream(vec![StreamEvent::delta("partial")]);
        // The mock stream ends without a complete event; aggregation
        // still returns the partial text.
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        let content = manager
            .send_streaming_prompt("x", CompletionParams::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(content, "partial");
    }

    #[tokio::test]
    async fn test_streaming_populates_cache() {
        let cache = Arc::new(MemoryCache::new());
        let manager = ProviderManager::builder()
            .cache(cache.clone() as Arc<dyn ResponseCache>)
            .build();
        let mock = Arc::new(MockProvider::new("m"));
        mock.queue_stream(vec![
            StreamEvent::delta("str"),
            StreamEvent::delta("eamed"),
            StreamEvent::complete("streamed", None),
        ]);
        manager.register_provider("a", "A", mock, RegisterOptions::default());

        manager
            .send_streaming_prompt("q", CompletionParams::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(cache.get("q").as_deref(), Some("streamed"));
    }

    // --- settings ---

    struct CountingFactory {
        family: &'static str,
        builds: AtomicUsize,
    }

    impl CountingFactory {
        fn new(family: &'static str) -> Arc<Self> {
            Arc::new(Self {
                family,
                builds: AtomicUsize::new(0),
            })
        }
    }

    impl ProviderFactory for CountingFactory {
        fn family(&self) -> &str {
            self.family
        }
        fn build(
            &self,
            settings: &ProviderSettings,
        ) -> Result<Arc<dyn DynProvider>, RelayError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockProvider::new(settings.model.clone())))
        }
    }

    fn two_provider_settings() -> RelaySettings {
        RelaySettings {
            providers: vec![
                {
                    let mut s = ProviderSettings::new("local", "mockfam", "llama3.2");
                    s.default = true;
                    s.priority = 5;
                    s
                },
                ProviderSettings::new("backup", "mockfam", "qwen2.5"),
            ],
        }
    }

    #[test]
    fn test_load_settings_registers_providers() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory.clone() as Arc<dyn ProviderFactory>)
            .build();

        let events = manager.load_provider_settings(&two_provider_settings());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        assert_eq!(manager.providers().len(), 2);
        assert_eq!(manager.default_provider().unwrap().id, "local");
        assert!(events
            .iter()
            .any(|e| matches!(e, RegistryEvent::ProviderRegistered { id } if id == "backup")));
    }

    #[test]
    fn test_load_settings_idempotent() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory.clone() as Arc<dyn ProviderFactory>)
            .build();

        let settings = two_provider_settings();
        manager.load_provider_settings(&settings);
        let default_before = manager.default_provider().unwrap().id;

        let events = manager.load_provider_settings(&settings);
        assert!(events.is_empty());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
        assert_eq!(manager.default_provider().unwrap().id, default_before);
    }

    #[test]
    fn test_load_settings_rebuilds_changed_entry() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory.clone() as Arc<dyn ProviderFactory>)
            .build();

        let mut settings = two_provider_settings();
        manager.load_provider_settings(&settings);

        settings.providers[1].model = "qwen3".into();
        let events = manager.load_provider_settings(&settings);
        assert_eq!(factory.builds.load(Ordering::SeqCst), 3);
        assert!(!events.is_empty());
        let backup = manager.provider("backup").unwrap();
        assert_eq!(backup.adapter.capabilities().model, "qwen3");
    }

    #[test]
    fn test_load_settings_default_entry_listed_later_wins() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory as Arc<dyn ProviderFactory>)
            .build();

        let settings = RelaySettings {
            providers: vec![ProviderSettings::new("backup", "mockfam", "qwen2.5"), {
                let mut s = ProviderSettings::new("local", "mockfam", "llama3.2");
                s.default = true;
                s
            }],
        };
        manager.load_provider_settings(&settings);
        assert_eq!(manager.default_provider().unwrap().id, "local");
    }

    #[test]
    fn test_load_settings_rebuilt_default_keeps_flag() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory as Arc<dyn ProviderFactory>)
            .build();

        let mut settings = two_provider_settings();
        manager.load_provider_settings(&settings);
        assert_eq!(manager.default_provider().unwrap().id, "local");

        // Rebuilding the default entry must not strand the flag on a
        // survivor.
        settings.providers[0].model = "llama3.3".into();
        manager.load_provider_settings(&settings);
        assert_eq!(manager.default_provider().unwrap().id, "local");
    }

    #[test]
    fn test_load_settings_removes_stale_entries() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory as Arc<dyn ProviderFactory>)
            .build();

        let mut settings = two_provider_settings();
        manager.load_provider_settings(&settings);

        settings.providers.pop();
        let events = manager.load_provider_settings(&settings);
        assert!(manager.provider("backup").is_none());
        assert!(events
            .iter()
            .any(|e| matches!(e, RegistryEvent::ProviderUnregistered { id } if id == "backup")));
    }

    #[test]
    fn test_load_settings_preserves_manual_registrations() {
        let factory = CountingFactory::new("mockfam");
        let manager = ProviderManager::builder()
            .factory(factory as Arc<dyn ProviderFactory>)
            .build();
        manager.register_provider("manual", "M", mock_adapter("hand"), RegisterOptions::default());

        // Settings entry colliding with the manual id is skipped.
        let settings = RelaySettings {
            providers: vec![ProviderSettings::new("manual", "mockfam", "other")],
        };
        manager.load_provider_settings(&settings);
        let manual = manager.provider("manual").unwrap();
        assert_eq!(manual.source, RegistrationSource::Manual);
        assert_eq!(manual.adapter.capabilities().model, "hand");

        // And a reload dropping the entry does not unregister it.
        manager.load_provider_settings(&RelaySettings::default());
        assert!(manager.provider("manual").is_some());
    }

    #[test]
    fn test_load_settings_unknown_family_skipped() {
        let manager = ProviderManager::builder().build();
        let settings = RelaySettings {
            providers: vec![ProviderSettings::new("x", "martian", "m")],
        };
        let events = manager.load_provider_settings(&settings);
        assert!(events.is_empty());
        assert!(manager.providers().is_empty());
    }

    // --- invariant ---

    #[test]
    fn test_at_most_one_default_under_mutation() {
        let (manager, _) = observed_manager();
        for i in 0..6 {
            manager.register_provider(
                &format!("p{i}"),
                "P",
                mock_adapter("m"),
                RegisterOptions {
                    priority: i % 3,
                    is_default: i == 4,
                    ..Default::default()
                },
            );
        }
        for id in ["p4", "p0", "p2"] {
            manager.unregister_provider(id);
            let defaults = manager
                .providers()
                .iter()
                .filter(|r| r.is_default)
                .count();
            assert_eq!(defaults, 1);
        }
    }
}
