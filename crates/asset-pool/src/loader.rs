//! Collaborator traits: how resources are produced and identified.
//!
//! The registry never builds resources itself. A miss in
//! [`Registry::load_or_insert`](crate::Registry::load_or_insert) calls a
//! loader closure; [`Loader`] is the trait form of the same contract for
//! collaborators that also know how to judge whether a cached resource is
//! still good.

use std::sync::Arc;

use crate::error::BoxError;

/// What a loader hands back: a resource, nothing, or a failure.
///
/// `Ok(None)` means the loader ran but found nothing to load. The registry
/// reports it as [`Error::EmptyLoad`](crate::Error::EmptyLoad).
pub type LoadResult<R> = Result<Option<Arc<R>>, BoxError>;

/// A loader collaborator.
pub trait Loader<R: ?Sized> {
    /// Caller-supplied options. The registry passes them through without
    /// looking at them.
    type Options: ?Sized;

    /// Produce the resource for `key`.
    fn load(&self, key: &str, options: &Self::Options) -> LoadResult<R>;

    /// Check whether a cached resource is still valid (e.g. not stale on disk).
    fn is_valid(&self, _key: &str, _resource: &R) -> bool {
        true
    }
}

impl<R: ?Sized, L: Loader<R> + ?Sized> Loader<R> for &L {
    type Options = L::Options;

    fn load(&self, key: &str, options: &Self::Options) -> LoadResult<R> {
        (**self).load(key, options)
    }

    fn is_valid(&self, key: &str, resource: &R) -> bool {
        (**self).is_valid(key, resource)
    }
}

/// A resource that knows its own key, e.g. the filename it was loaded from.
///
/// Used by [`Registry::add_keyed`](crate::Registry::add_keyed).
pub trait Keyed {
    /// The key this resource should be registered under, if it has one.
    fn pool_key(&self) -> Option<&str>;
}

impl<T: Keyed + ?Sized> Keyed for Arc<T> {
    fn pool_key(&self) -> Option<&str> {
        (**self).pool_key()
    }
}
