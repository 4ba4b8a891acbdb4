use std::{
    collections::HashMap,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{LoadError, LoadResult};

/// Sending half handed to the registry on behalf of a caller.
type Waiter = oneshot::Sender<LoadResult>;

/// Receiving half kept by the caller until the key settles.
pub type Ticket = oneshot::Receiver<LoadResult>;

enum Entry {
    Loaded,
    Pending(Vec<Waiter>),
}

/// What a caller has to do after registering interest in a key.
pub enum Registration {
    /// Nothing; the key is already loaded.
    AlreadyLoaded,

    /// Another caller is loading the key, wait on the ticket.
    Joined(Ticket),

    /// The caller is queued first and must run the underlying load, then
    /// report it through `resolve_all` / `reject_all`.
    FirstRequester(Ticket),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    Unloaded,
    Pending(usize),
    Loaded,
}

/// Per-kind map from key to load state.
///
/// The pending entry doubles as the mutex over the underlying load: only
/// the caller that created it may start one.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub async fn register(&self, key: &str) -> Registration {
        let mut entries = self.entries.lock().await;

        match entries.get_mut(key) {
            Some(Entry::Loaded) => Registration::AlreadyLoaded,
            Some(Entry::Pending(waiters)) => {
                let (send, recv) = oneshot::channel();
                waiters.push(send);
                trace!("Joined pending load of `{}` ({} waiting)", key, waiters.len());
                Registration::Joined(recv)
            }
            None => {
                let (send, recv) = oneshot::channel();
                entries.insert(key.to_string(), Entry::Pending(vec![send]));
                Registration::FirstRequester(recv)
            }
        }
    }

    /// Mark a pending key loaded and release its waiters in registration
    /// order. Returns how many waiters were notified.
    pub async fn resolve_all(&self, key: &str) -> usize {
        let waiters = {
            let mut entries = self.entries.lock().await;
            let Some(Entry::Pending(waiters)) = entries.get_mut(key) else {
                return 0;
            };
            let waiters = std::mem::take(waiters);
            entries.insert(key.to_string(), Entry::Loaded);
            waiters
        };

        debug!("Loaded `{}`, notifying {} waiter(s)", key, waiters.len());
        notify(waiters, || Ok(()))
    }

    /// Forget a pending key so it can be retried, and fail its waiters.
    pub async fn reject_all(&self, key: &str, error: LoadError) -> usize {
        let waiters = {
            let mut entries = self.entries.lock().await;
            match entries.remove(key) {
                Some(Entry::Pending(waiters)) => waiters,
                Some(Entry::Loaded) => {
                    entries.insert(key.to_string(), Entry::Loaded);
                    return 0;
                }
                None => return 0,
            }
        };

        debug!("Failed `{}`, notifying {} waiter(s)", key, waiters.len());
        notify(waiters, || Err(error.clone()))
    }

    pub async fn state(&self, key: &str) -> KeyState {
        match self.entries.lock().await.get(key) {
            None => KeyState::Unloaded,
            Some(Entry::Loaded) => KeyState::Loaded,
            Some(Entry::Pending(waiters)) => KeyState::Pending(waiters.len()),
        }
    }

    /// Register for `key` and wait for it to settle.
    ///
    /// `operation` is called only when this caller is the first requester.
    /// Its synchronous part runs inline, the returned future is driven on a
    /// spawned task so that dropping this caller never strands the others.
    /// A panic in either part fails every waiter with
    /// [`LoadError::Abandoned`] and leaves the key free for a retry.
    pub async fn coalesce<F, Fut>(self: &Arc<Self>, key: &str, operation: F) -> LoadResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult> + Send + 'static,
    {
        let ticket = match self.register(key).await {
            Registration::AlreadyLoaded => return Ok(()),
            Registration::Joined(ticket) => ticket,
            Registration::FirstRequester(ticket) => {
                let started = panic::catch_unwind(AssertUnwindSafe(operation));
                let registry = Arc::clone(self);
                let key_ = key.to_string();

                tokio::spawn(async move {
                    let outcome = match started {
                        Ok(pending) => AssertUnwindSafe(pending).catch_unwind().await.ok(),
                        Err(_) => None,
                    };

                    match outcome {
                        Some(Ok(())) => registry.resolve_all(&key_).await,
                        Some(Err(err)) => registry.reject_all(&key_, err).await,
                        None => {
                            warn!("Load of `{}` panicked", key_);
                            let err = LoadError::Abandoned { key: key_.clone() };
                            registry.reject_all(&key_, err).await
                        }
                    };
                });

                ticket
            }
        };

        ticket.await.unwrap_or_else(|_| {
            Err(LoadError::Abandoned {
                key: key.to_string(),
            })
        })
    }
}

fn notify(waiters: Vec<Waiter>, outcome: impl Fn() -> LoadResult) -> usize {
    let count = waiters.len();
    for waiter in waiters {
        // a dropped receiver only means that caller stopped waiting
        let _ = waiter.send(outcome());
    }
    count
}
