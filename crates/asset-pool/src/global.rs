//! The process-wide registry.
//!
//! Created on first use and never torn down. It stores type-erased resources;
//! the `*_as` methods add the downcast back to a concrete type.

use std::any::{Any, type_name};
use std::sync::{Arc, LazyLock};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::loader::LoadResult;
use crate::registry::Registry;

/// Resource type stored by the global registry.
pub type AnyResource = dyn Any + Send + Sync;

static GLOBAL: LazyLock<Registry<AnyResource>> =
    LazyLock::new(|| Registry::from_config(RegistryConfig::named("global asset pool")));

/// The process-wide registry.
///
/// Prefer passing a [`Registry`] around explicitly; this exists for code that
/// has no better place to keep one.
pub fn global() -> &'static Registry<AnyResource> {
    &GLOBAL
}

impl Registry<AnyResource> {
    /// The cached resource for `key` as a `T`.
    ///
    /// `Ok(None)` if the key is absent, [`Error::TypeMismatch`] if the entry
    /// holds some other type.
    pub fn get_as<T>(&self, key: &str) -> Result<Option<Arc<T>>>
    where
        T: Any + Send + Sync,
    {
        self.get(key)
            .map(|resource| downcast(key, resource))
            .transpose()
    }

    /// Typed [`load_or_insert`](Registry::load_or_insert).
    ///
    /// A hit on an entry of another type fails with
    /// [`Error::TypeMismatch`] and leaves the entry in place.
    pub fn load_or_insert_as<T, O, F>(&self, key: &str, loader_fn: F, options: &O) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        O: ?Sized,
        F: FnOnce(&str, &O) -> LoadResult<T>,
    {
        let resource = self.load_or_insert(
            key,
            |key, options| Ok(loader_fn(key, options)?.map(|loaded| loaded as Arc<AnyResource>)),
            options,
        )?;
        downcast(key, resource)
    }
}

fn downcast<T>(key: &str, resource: Arc<AnyResource>) -> Result<Arc<T>>
where
    T: Any + Send + Sync,
{
    resource.downcast::<T>().map_err(|_| Error::TypeMismatch {
        key: key.to_owned(),
        expected: type_name::<T>(),
    })
}
