//! Delivery of [`Event`]s to application listeners.
//!
//! Producers (socket actor, call controller, caption manager) enqueue events
//! after applying the state change that caused them. A single task delivers
//! them in enqueue order: synchronous handlers run inline, asynchronous ones
//! each get their own task, and the next event is not delivered until every
//! handler has finished with the current one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use videocore::listeners::{
    DispatchError, ListenerFailure, ListenerRegistry, SubscriptionHandle, panic_message,
    run_isolated,
};
use videocore::types::events::{Event, EventHandler};

#[async_trait]
pub trait AsyncEventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: Arc<Event>) -> anyhow::Result<()>;
}

pub enum Subscriber {
    Sync(Arc<dyn EventHandler>),
    Async(Arc<dyn AsyncEventHandler>),
}

/// Cheap to clone; every clone feeds the same delivery task.
#[derive(Clone)]
pub struct Dispatcher {
    queue: mpsc::UnboundedSender<Event>,
    subscribers: Arc<ListenerRegistry<Subscriber>>,
}

impl Dispatcher {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let subscribers = Arc::new(ListenerRegistry::new());
        tokio::spawn(delivery_loop(rx, subscribers.clone()));
        Self { queue, subscribers }
    }

    pub fn emit(&self, event: Event) {
        if self.queue.send(event).is_err() {
            debug!(target: "Dispatch", "Delivery task is gone, dropping event");
        }
    }

    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) -> SubscriptionHandle {
        self.subscribers.subscribe(Arc::new(Subscriber::Sync(handler)))
    }

    pub fn subscribe_async(&self, handler: Arc<dyn AsyncEventHandler>) -> SubscriptionHandle {
        self.subscribers
            .subscribe(Arc::new(Subscriber::Async(handler)))
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.unsubscribe(handle)
    }

    pub fn listener_count(&self) -> usize {
        self.subscribers.len()
    }
}

async fn delivery_loop(
    mut rx: mpsc::UnboundedReceiver<Event>,
    subscribers: Arc<ListenerRegistry<Subscriber>>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = deliver(&subscribers, Arc::new(event)).await {
            for failure in &e.failures {
                warn!(
                    target: "Dispatch",
                    "{} failed to handle event: {:#}", failure.subscription, failure.error
                );
            }
        }
    }
    debug!(target: "Dispatch", "All producers dropped, delivery task exiting");
}

/// Delivers one event to every current subscriber.
pub async fn deliver(
    subscribers: &ListenerRegistry<Subscriber>,
    event: Arc<Event>,
) -> Result<usize, DispatchError> {
    let entries = subscribers.snapshot();
    let mut failures = Vec::new();
    let mut tasks = JoinSet::new();
    let mut owners = HashMap::new();

    for (handle, subscriber) in entries.iter() {
        match subscriber.as_ref() {
            Subscriber::Sync(handler) => {
                if let Err(error) = run_isolated(|| handler.handle_event(&event)) {
                    failures.push(ListenerFailure {
                        subscription: *handle,
                        error,
                    });
                }
            }
            Subscriber::Async(handler) => {
                let handler = handler.clone();
                let event = event.clone();
                let task = tasks.spawn(async move { handler.handle_event(event).await });
                owners.insert(task.id(), *handle);
            }
        }
    }

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, error) = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((id, Err(error))) => (id, error),
            Err(join_error) => {
                let id = join_error.id();
                let error = match join_error.try_into_panic() {
                    Ok(panic) => anyhow::anyhow!("listener panicked: {}", panic_message(&*panic)),
                    Err(join_error) => anyhow::anyhow!("listener task failed: {join_error}"),
                };
                (id, error)
            }
        };
        if let Some(subscription) = owners.get(&id) {
            failures.push(ListenerFailure {
                subscription: *subscription,
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
