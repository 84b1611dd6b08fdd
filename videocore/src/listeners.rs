use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

/// Token returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Debug)]
pub struct ListenerFailure {
    pub subscription: SubscriptionHandle,
    pub error: anyhow::Error,
}

/// One or more listeners failed while the rest still received the event.
#[derive(Debug, Error)]
#[error("{} of {delivered} listeners failed", failures.len())]
pub struct DispatchError {
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
}

type Entries<L> = Arc<Vec<(SubscriptionHandle, Arc<L>)>>;

/// Thread-safe set of listeners.
///
/// Mutations replace the whole list, so dispatch iterates a snapshot and
/// never holds the lock while a listener runs. A listener may subscribe or
/// unsubscribe (itself included) from inside a callback.
pub struct ListenerRegistry<L: ?Sized> {
    entries: RwLock<Entries<L>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<L>) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((handle, listener));
        *entries = Arc::new(next);
        handle
    }

    /// Returns `false` if the handle was not registered.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|(h, _)| *h == handle) {
            return false;
        }
        let next: Vec<_> = entries
            .iter()
            .filter(|(h, _)| *h != handle)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    pub fn clear(&self) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn snapshot(&self) -> Entries<L> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs `action` on every listener registered when the call started.
    ///
    /// Errors and panics are captured per listener. Returns the number of
    /// listeners that ran, or a [`DispatchError`] listing the ones that failed.
    pub fn for_each<F>(&self, mut action: F) -> Result<usize, DispatchError>
    where
        F: FnMut(&L) -> anyhow::Result<()>,
    {
        let entries = self.snapshot();
        let mut failures = Vec::new();
        for (handle, listener) in entries.iter() {
            if let Err(error) = run_isolated(|| action(&**listener)) {
                failures.push(ListenerFailure {
                    subscription: *handle,
                    error,
                });
            }
        }
        if failures.is_empty() {
            Ok(entries.len())
        } else {
            Err(DispatchError {
                delivered: entries.len(),
                failures,
            })
        }
    }
}

/// Runs one listener callback, turning a panic into an error.
pub fn run_isolated<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => Err(anyhow::anyhow!(
            "listener panicked: {}",
            panic_message(&*panic)
        )),
    }
}

pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
