//! # Asset Pool
//!
//! A thread-safe registry that keeps at most one live instance per resource
//! key. Asking twice for the same key returns the same shared object instead
//! of loading it again.
//!
//! The registry sits under a resource loader. It does not read files, resolve
//! paths or schedule background loads: keys are used exactly as given, and
//! building a resource is delegated to a loader closure or a [`Loader`].
//!
//! Lifetimes follow `Arc` semantics. The registry owns one reference per
//! entry; [`Registry::garbage_collect`] drops the entries nobody else holds.
//!
//! ```
//! use std::sync::Arc;
//! use asset_pool::Registry;
//!
//! let registry: Registry<Vec<u8>> = Registry::new();
//! let bytes = registry
//!     .load_or_insert("a.model", |_, _| Ok(Some(Arc::new(vec![1, 2, 3]))), &())
//!     .unwrap();
//!
//! assert!(registry.has("a.model"));
//! assert_eq!(registry.garbage_collect(), 0); // `bytes` is still held
//! drop(bytes);
//! assert_eq!(registry.garbage_collect(), 1);
//! ```

pub mod config;
pub mod error;
pub mod global;
pub mod loader;
pub mod registry;
pub mod report;
pub mod stats;

pub use config::RegistryConfig;
pub use error::{BoxError, Error, Result};
pub use global::{AnyResource, global};
pub use loader::{Keyed, LoadResult, Loader};
pub use registry::Registry;
pub use report::EntryInfo;
pub use stats::RegistryStats;
