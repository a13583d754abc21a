//! Error types for registry operations
use thiserror::Error;

/// Boxed error produced by a loader collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry.
///
/// Looking up or releasing a key that is not present is not an error: those
/// operations report absence through `bool`/`Option` so cleanup stays
/// idempotent.
#[derive(Error, Debug)]
pub enum Error {
    /// Registry configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The loader could not produce a resource for the key
    #[error("Failed to load '{key}': {source}")]
    Load {
        /// The key that was being loaded
        key: String,
        /// The error reported by the loader
        #[source]
        source: BoxError,
    },

    /// The loader finished without producing a resource
    #[error("Loader returned no resource for '{key}'")]
    EmptyLoad {
        /// The key that was being loaded
        key: String,
    },

    /// A typed lookup found a resource of a different concrete type
    #[error("Resource '{key}' is not a {expected}")]
    TypeMismatch {
        /// The key that was looked up
        key: String,
        /// Name of the type the caller asked for
        expected: &'static str,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a load error wrapping the loader's failure
    pub fn load<K: Into<String>>(key: K, source: impl Into<BoxError>) -> Self {
        Self::Load {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Load failures are never cached, so asking again may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::EmptyLoad { .. })
    }

    /// Get the key associated with this error (if any)
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::Load { key, .. } | Self::EmptyLoad { key } | Self::TypeMismatch { key, .. } => {
                Some(key)
            }
        }
    }
}
