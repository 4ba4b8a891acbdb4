// Script and stylesheet loading with at most one in-flight load per URL.

mod batch;
mod kind;

use std::{marker::PhantomData, sync::Arc};

use tracing::{info, warn};

pub use kind::{ResourceKind, Script, Stylesheet};

use crate::{
    error::{LoadError, LoadResult},
    host::{BoxFuture, Document, Parent},
    registry::Registry,
};

pub struct ResourceLoader<K> {
    document: Arc<dyn Document>,
    registry: Arc<Registry>,
    kind: PhantomData<fn() -> K>,
}

impl<K> Clone for ResourceLoader<K> {
    fn clone(&self) -> Self {
        ResourceLoader {
            document: Arc::clone(&self.document),
            registry: Arc::clone(&self.registry),
            kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> ResourceLoader<K> {
    pub fn new(document: Arc<dyn Document>) -> Self {
        ResourceLoader {
            document,
            registry: Arc::new(Registry::new()),
            kind: PhantomData,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load `url` once. Concurrent callers share the in-flight load, later
    /// callers succeed immediately; a failure is reported to everyone
    /// waiting and leaves the URL free to be retried.
    pub async fn load(&self, url: &str) -> LoadResult {
        if url.is_empty() {
            return Ok(());
        }

        let key = K::normalize(url);
        info!("Queueing {} {}", K::NAME, key);

        let document = Arc::clone(&self.document);
        let operation_key = key.clone();
        self.registry
            .coalesce(&key, move || start::<K>(document, operation_key))
            .await
    }
}

/// Probe for `key`, otherwise put its element into the head and wait on it.
fn start<K: ResourceKind>(document: Arc<dyn Document>, key: String) -> BoxFuture<LoadResult> {
    if document.query(K::TAG, K::URL_ATTRIBUTE, &key) {
        info!("{} {} is already present", K::NAME, key);
        return Box::pin(async { LoadResult::Ok(()) });
    }

    let (id, signal) = document.append_resource(Parent::Head, K::element(&key));

    Box::pin(async move {
        match signal.await {
            Ok(()) => {
                info!("Loaded {} {}", K::NAME, key);
                Ok(())
            }
            Err(err) => {
                warn!("Failed to load {} {}: {:#}", K::NAME, key, err);
                // a failed element must not satisfy the probe on retry
                document.remove(id);
                Err(LoadError::resource(&key, err))
            }
        }
    })
}
