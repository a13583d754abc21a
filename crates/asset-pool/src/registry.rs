//! The registry: at most one live instance per key.
//!
//! One `parking_lot::Mutex` guards the key map. Loads run outside that lock;
//! callers missing on the same key queue on a per-key gate instead, so a slow
//! load only holds up the callers that want the same resource.
//!
//! Every resource the registry lets go of (release, replacement, eviction) is
//! dropped after the map lock is released.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::loader::{Keyed, LoadResult, Loader};
use crate::report::{self, EntryInfo};
use crate::stats::{Counters, RegistryStats};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Gate serializing the miss path for one key.
struct Pending {
    gate: Arc<Mutex<()>>,
    /// Callers currently holding a ticket for this key.
    waiters: usize,
}

struct State<R: ?Sized> {
    entries: HashMap<String, Arc<R>>,
    /// Present only while some caller is on the miss path for the key.
    in_flight: HashMap<String, Pending>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Keeps at most one live instance per key and hands out shared handles to it.
///
/// The registry holds exactly one `Arc` per entry. Callers may keep as many
/// clones as they like; the registry only ever drops its own.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use asset_pool::Registry;
///
/// let registry: Registry<String> = Registry::new();
/// let first = registry
///     .load_or_insert("a.model", |key, _| Ok(Some(Arc::new(key.to_owned()))), &())
///     .unwrap();
/// let second = registry
///     .load_or_insert("a.model", |_, _| unreachable!("already cached"), &())
///     .unwrap();
/// assert!(Arc::ptr_eq(&first, &second));
/// ```
pub struct Registry<R: ?Sized> {
    config: RegistryConfig,
    state: Mutex<State<R>>,
    counters: Counters,
}

impl<R: ?Sized> Registry<R> {
    /// Create a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(RegistryConfig::default())
    }

    /// Create a registry with a validated configuration.
    pub fn with_config(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    pub(crate) fn from_config(config: RegistryConfig) -> Self {
        let capacity = config.initial_capacity;
        Self {
            config,
            state: Mutex::new(State {
                entries: HashMap::with_capacity(capacity),
                in_flight: HashMap::new(),
            }),
            counters: Counters::default(),
        }
    }

    /// The registry's configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Whether an entry for `key` exists.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// The cached resource for `key`, without loading anything.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<R>> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Whether `key` is cached and `loader` still considers it valid.
    ///
    /// The validity check runs without the map lock held.
    pub fn verify<L>(&self, key: &str, loader: &L) -> bool
    where
        L: Loader<R> + ?Sized,
    {
        self.get(key)
            .is_some_and(|resource| loader.is_valid(key, &resource))
    }

    /// Return the cached resource for `key`, loading it on a miss.
    ///
    /// On a miss `loader_fn(key, options)` runs without the map lock held.
    /// Concurrent callers for the same key wait for it instead of loading a
    /// second copy. A failed or empty load is returned to the caller and
    /// nothing is cached.
    ///
    /// If [`add`](Self::add) installs the key while the loader runs, the
    /// installed resource wins and the freshly loaded one is dropped.
    ///
    /// The loader must not load the same key through this registry; that
    /// call would wait on itself.
    pub fn load_or_insert<O, F>(&self, key: &str, loader_fn: F, options: &O) -> Result<Arc<R>>
    where
        O: ?Sized,
        F: FnOnce(&str, &O) -> LoadResult<R>,
    {
        let ticket = {
            let mut state = self.state.lock();
            let cached = state.entries.get(key).cloned();
            if let Some(found) = cached {
                drop(state);
                self.counters.hit();
                tracing::trace!(registry = %self.config.name, key, "Cache hit");
                return Ok(found);
            }
            InFlight::enter(self, &mut state, key)
        };

        let _serial = ticket.gate.lock();

        // The previous holder of the gate may have finished this load.
        if let Some(found) = self.get(key) {
            self.counters.hit();
            tracing::trace!(registry = %self.config.name, key, "Cache hit after waiting on load");
            return Ok(found);
        }

        self.counters.miss();
        let loaded = match loader_fn(key, options) {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                self.counters.load_failed();
                tracing::warn!(registry = %self.config.name, key, "Loader returned no resource");
                return Err(Error::EmptyLoad {
                    key: key.to_owned(),
                });
            }
            Err(source) => {
                self.counters.load_failed();
                tracing::warn!(
                    registry = %self.config.name,
                    key,
                    error = %source,
                    "Failed to load resource"
                );
                return Err(Error::Load {
                    key: key.to_owned(),
                    source,
                });
            }
        };
        self.counters.loaded();

        let stored = {
            let mut state = self.state.lock();
            let stored = state
                .entries
                .entry(key.to_owned())
                .or_insert_with(|| Arc::clone(&loaded));
            Arc::clone(stored)
        };

        if Arc::ptr_eq(&stored, &loaded) {
            tracing::debug!(registry = %self.config.name, key, "Loaded resource");
        } else {
            tracing::debug!(
                registry = %self.config.name,
                key,
                "Resource was added during load; discarding loaded copy"
            );
        }
        Ok(stored)
    }

    /// [`load_or_insert`](Self::load_or_insert) driven by a [`Loader`].
    pub fn load_with<L>(&self, key: &str, loader: &L, options: &L::Options) -> Result<Arc<R>>
    where
        L: Loader<R> + ?Sized,
    {
        self.load_or_insert(key, |key, options| loader.load(key, options), options)
    }

    /// Install `resource` under `key`, replacing any existing entry.
    ///
    /// The replaced resource loses the registry's reference; callers that
    /// still hold it keep it alive.
    pub fn add(&self, key: impl Into<String>, resource: Arc<R>) {
        let key = key.into();
        let replaced = self.state.lock().entries.insert(key.clone(), resource);
        tracing::debug!(
            registry = %self.config.name,
            key = %key,
            replaced = replaced.is_some(),
            "Added resource"
        );
    }

    /// Install `resource` under the key it reports through [`Keyed`].
    ///
    /// Returns `false` and does nothing if the resource has no key. An
    /// existing entry under the derived key is replaced, as with
    /// [`add`](Self::add).
    pub fn add_keyed(&self, resource: Arc<R>) -> bool
    where
        R: Keyed,
    {
        let Some(key) = resource.pool_key().map(str::to_owned) else {
            tracing::debug!(registry = %self.config.name, "Resource has no key; not added");
            return false;
        };
        self.add(key, resource);
        true
    }

    /// Remove the entry for `key`.
    ///
    /// Returns whether there was one. Absent keys are a no-op.
    pub fn release(&self, key: &str) -> bool {
        let removed = self.state.lock().entries.remove(key);
        let Some(resource) = removed else {
            return false;
        };
        self.counters.released(1);
        tracing::debug!(
            registry = %self.config.name,
            key,
            external = Arc::strong_count(&resource).saturating_sub(1),
            "Released resource"
        );
        true
    }

    /// Remove the entry holding this exact resource, whatever its key.
    ///
    /// Matches on identity, not value. Returns whether an entry was removed.
    pub fn release_resource(&self, resource: &Arc<R>) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let key = state
                .entries
                .iter()
                .find(|(_, stored)| Arc::ptr_eq(stored, resource))
                .map(|(key, _)| key.clone());
            key.and_then(|key| state.entries.remove_entry(&key))
        };
        let Some((key, _resource)) = removed else {
            return false;
        };
        self.counters.released(1);
        tracing::debug!(registry = %self.config.name, key = %key, "Released resource by identity");
        true
    }

    /// Drop the registry's reference to every entry and clear the map.
    ///
    /// Resources still held elsewhere survive, detached from the registry: a
    /// later load of the same key produces a new instance. Returns the number
    /// of entries removed.
    pub fn release_all(&self) -> usize {
        let drained = std::mem::take(&mut self.state.lock().entries);
        let count = drained.len();
        self.counters.released(count);
        tracing::info!(registry = %self.config.name, count, "Released all resources");
        count
    }

    /// Remove every entry that nothing outside the registry refers to.
    ///
    /// Entries with outside holders are kept no matter how long they have been
    /// idle. Returns the number of entries removed.
    ///
    /// New strong references to a stored resource come either from an existing
    /// outside holder or from the map under its lock, so a count of one seen
    /// under the lock cannot change before the entry is removed. Weak handles
    /// do not keep an entry alive; one upgraded during the sweep ends up
    /// holding a resource the registry no longer knows about.
    pub fn garbage_collect(&self) -> usize {
        let evicted: Vec<(String, Arc<R>)> = self
            .state
            .lock()
            .entries
            .extract_if(|_, resource| Arc::strong_count(resource) == 1)
            .collect();

        for (key, _) in &evicted {
            tracing::trace!(registry = %self.config.name, key = %key, "Evicted resource");
        }

        let count = evicted.len();
        self.counters.evicted(count);
        if count > 0 {
            tracing::info!(registry = %self.config.name, count, "Garbage collected resources");
        }
        count
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Per-entry reference counts, sorted by key, taken under one lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EntryInfo> {
        let mut entries: Vec<EntryInfo> = self
            .state
            .lock()
            .entries
            .iter()
            .map(|(key, resource)| EntryInfo {
                key: key.clone(),
                // The count includes the handle the registry stores.
                references: Arc::strong_count(resource),
            })
            .collect();
        entries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.counters.snapshot()
    }

    /// Write every key to `out`.
    pub fn list_contents(&self, out: &mut impl fmt::Write) -> fmt::Result {
        report::list_contents(&self.config.name, &self.snapshot(), out)
    }

    /// Write every key with its reference counts to `out`.
    pub fn write(&self, out: &mut impl fmt::Write) -> fmt::Result {
        report::write(&self.config.name, &self.snapshot(), out)
    }
}

impl<R: ?Sized> Default for Registry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ?Sized> fmt::Display for Registry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.list_contents(f)
    }
}

impl<R: ?Sized> fmt::Debug for Registry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.config.name)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InFlight
// ---------------------------------------------------------------------------

/// A caller's place on the miss path for one key.
///
/// Dropping the ticket (including during a panic in the loader) retires the
/// key's gate once its last waiter is gone.
struct InFlight<'a, R: ?Sized> {
    registry: &'a Registry<R>,
    key: &'a str,
    gate: Arc<Mutex<()>>,
}

impl<'a, R: ?Sized> InFlight<'a, R> {
    fn enter(registry: &'a Registry<R>, state: &mut State<R>, key: &'a str) -> Self {
        let pending = state
            .in_flight
            .entry(key.to_owned())
            .or_insert_with(|| Pending {
                gate: Arc::default(),
                waiters: 0,
            });
        pending.waiters += 1;
        Self {
            registry,
            key,
            gate: Arc::clone(&pending.gate),
        }
    }
}

impl<R: ?Sized> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        let drained = match state.in_flight.get_mut(self.key) {
            Some(pending) => {
                pending.waiters = pending.waiters.saturating_sub(1);
                pending.waiters == 0
            }
            None => false,
        };
        if drained {
            state.in_flight.remove(self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Model {
        name: String,
    }

    impl Keyed for Model {
        fn pool_key(&self) -> Option<&str> {
            if self.name.is_empty() {
                None
            } else {
                Some(&self.name)
            }
        }
    }

    fn model(name: &str) -> Arc<Model> {
        Arc::new(Model {
            name: name.to_owned(),
        })
    }

    fn load_model(key: &str, _options: &()) -> LoadResult<Model> {
        Ok(Some(model(key)))
    }

    #[test]
    fn miss_loads_and_hit_returns_same_instance() {
        let registry = Registry::new();
        let first = registry.load_or_insert("a.model", load_model, &()).unwrap();
        let second = registry
            .load_or_insert("a.model", |_, _: &()| panic!("must not reload"), &())
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        let stats = registry.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.loads, 1);
    }

    #[test]
    fn keys_are_not_normalized() {
        let registry = Registry::new();
        let relative = registry.load_or_insert("a.model", load_model, &()).unwrap();
        let absolute = registry.load_or_insert("/a.model", load_model, &()).unwrap();

        assert!(!Arc::ptr_eq(&relative, &absolute));
        assert_eq!(registry.keys(), vec!["/a.model", "a.model"]);
    }

    #[test]
    fn options_reach_the_loader() {
        struct Options {
            suffix: &'static str,
        }

        let registry: Registry<String> = Registry::new();
        let loaded = registry
            .load_or_insert(
                "a",
                |key, options: &Options| Ok(Some(Arc::new(format!("{key}{}", options.suffix)))),
                &Options { suffix: ".egg" },
            )
            .unwrap();
        assert_eq!(*loaded, "a.egg");
    }

    #[test]
    fn failed_load_is_not_cached() {
        let registry: Registry<Model> = Registry::new();
        let err = registry
            .load_or_insert("a.model", |_, _: &()| Err("corrupt file".into()), &())
            .unwrap_err();

        assert!(matches!(err, Error::Load { ref key, .. } if key == "a.model"));
        assert!(!registry.has("a.model"));
        assert!(registry.state.lock().in_flight.is_empty());

        let loaded = registry.load_or_insert("a.model", load_model, &()).unwrap();
        assert_eq!(loaded.name, "a.model");
        assert_eq!(registry.stats().failed_loads, 1);
    }

    #[test]
    fn empty_load_is_an_error() {
        let registry: Registry<Model> = Registry::new();
        let err = registry
            .load_or_insert("a.model", |_, _: &()| Ok(None), &())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyLoad { .. }));
        assert!(!registry.has("a.model"));
    }

    #[test]
    fn add_replaces_without_destroying_held_resource() {
        let registry = Registry::new();
        let old = model("old");
        registry.add("k", Arc::clone(&old));
        registry.add("k", model("new"));

        assert_eq!(registry.get("k").unwrap().name, "new");
        // Only our handle is left on the old one.
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_keyed_uses_resource_key() {
        let registry = Registry::new();
        assert!(registry.add_keyed(model("b.model")));
        assert!(registry.has("b.model"));

        assert!(!registry.add_keyed(model("")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_keyed_replaces_colliding_entry() {
        let registry = Registry::new();
        let old = model("k");
        registry.add("k", Arc::clone(&old));

        let new = model("k");
        assert!(registry.add_keyed(Arc::clone(&new)));

        assert!(Arc::ptr_eq(&registry.get("k").unwrap(), &new));
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let registry = Registry::new();
        registry.load_or_insert("a.model", load_model, &()).unwrap();

        assert!(registry.release("a.model"));
        assert!(!registry.release("a.model"));
        assert!(!registry.has("a.model"));
        assert_eq!(registry.stats().releases, 1);
    }

    #[test]
    fn release_resource_matches_identity_not_value() {
        let registry = Registry::new();
        let stored = registry.load_or_insert("a.model", load_model, &()).unwrap();
        let lookalike = model("a.model");

        assert!(!registry.release_resource(&lookalike));
        assert!(registry.has("a.model"));

        assert!(registry.release_resource(&stored));
        assert!(!registry.has("a.model"));
    }

    #[test]
    fn release_all_orphans_held_resources() {
        let registry = Registry::new();
        let held = registry.load_or_insert("a.model", load_model, &()).unwrap();
        registry.load_or_insert("b.model", load_model, &()).unwrap();

        assert_eq!(registry.release_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(Arc::strong_count(&held), 1);

        let fresh = registry.load_or_insert("a.model", load_model, &()).unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
    }

    #[test]
    fn garbage_collect_keeps_held_entries() {
        let registry = Registry::new();
        let held = registry.load_or_insert("held", load_model, &()).unwrap();
        registry.load_or_insert("idle", load_model, &()).unwrap();

        assert_eq!(registry.garbage_collect(), 1);
        assert!(registry.has("held"));
        assert!(!registry.has("idle"));

        drop(held);
        assert_eq!(registry.garbage_collect(), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().evictions, 2);
    }

    #[test]
    fn weak_handles_do_not_pin_entries() {
        let registry = Registry::new();
        let weak = Arc::downgrade(&registry.load_or_insert("a", load_model, &()).unwrap());

        assert_eq!(registry.garbage_collect(), 1);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn verify_consults_loader_predicate() {
        struct Freshness {
            stale: &'static str,
        }

        impl Loader<Model> for Freshness {
            type Options = ();

            fn load(&self, key: &str, _options: &()) -> LoadResult<Model> {
                Ok(Some(model(key)))
            }

            fn is_valid(&self, _key: &str, resource: &Model) -> bool {
                resource.name != self.stale
            }
        }

        let loader = Freshness { stale: "old.model" };
        let registry = Registry::new();
        registry.load_with("old.model", &loader, &()).unwrap();
        registry.load_with("new.model", &loader, &()).unwrap();

        assert!(!registry.verify("old.model", &loader));
        assert!(registry.verify("new.model", &loader));
        assert!(!registry.verify("missing.model", &loader));
    }

    #[test]
    fn snapshot_counts_external_holders() {
        let registry = Registry::new();
        let held = registry.load_or_insert("a", load_model, &()).unwrap();
        let _also = Arc::clone(&held);
        registry.load_or_insert("b", load_model, &()).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].key, "a");
        assert_eq!(snapshot[0].references, 3);
        assert_eq!(snapshot[1].key, "b");
        assert!(snapshot[1].is_collectable());
    }

    #[test]
    fn display_lists_contents() {
        let registry: Registry<Model> =
            Registry::with_config(RegistryConfig::named("models")).unwrap();
        registry.add("a.model", model("a.model"));

        assert_eq!(
            registry.to_string(),
            "models contents:\n  a.model\ntotal entries: 1\n"
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Registry::<Model>::with_config(RegistryConfig::named("")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn add_during_load_wins() {
        let registry = Registry::new();
        let installed = model("installed");
        let calls = AtomicUsize::new(0);

        let returned = registry
            .load_or_insert(
                "k",
                |key, _: &()| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    registry.add(key, Arc::clone(&installed));
                    Ok(Some(model("loaded")))
                },
                &(),
            )
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&returned, &installed));
    }

    #[test]
    fn gate_is_retired_after_load() {
        let registry = Registry::new();
        registry.load_or_insert("a", load_model, &()).unwrap();
        assert!(registry.state.lock().in_flight.is_empty());
    }
}
