use std::{sync::Arc, time::Duration};

/// Failure handed to every waiter queued on a key.
///
/// Cloneable so a single failure can be fanned out; the underlying host
/// error is shared behind an `Arc`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to load `{key}`: {reason:#}")]
    Resource {
        key: String,
        reason: Arc<anyhow::Error>,
    },

    #[error("Font `{family}` did not become available within {timeout:?}")]
    FontTimeout { family: String, timeout: Duration },

    #[error("Loader for `{key}` went away before reporting a result")]
    Abandoned { key: String },
}

impl LoadError {
    pub fn resource(key: impl ToString, reason: anyhow::Error) -> Self {
        LoadError::Resource {
            key: key.to_string(),
            reason: Arc::new(reason),
        }
    }

    /// The key this failure was reported for.
    pub fn key(&self) -> &str {
        use LoadError::*;
        match self {
            Resource { key, .. } | Abandoned { key } => key,
            FontTimeout { family, .. } => family,
        }
    }
}

pub type LoadResult = Result<(), LoadError>;
