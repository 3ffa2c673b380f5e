//! Event bus connecting the fill/cancel sources to their consumers
//!
//! Publishing spawns every subscribed handler concurrently and waits for all
//! of them to finish. A handler failure (or panic) is logged and never
//! surfaces to the publisher or cancels sibling handlers. No ordering is
//! guaranteed between subscribers of the same event; ordering across
//! sequential events from one source is preserved because `publish` only
//! returns once every handler has completed.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use log::{debug, error, info};
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::order::Order;

/// Events crossing the execution/simulation boundary
#[derive(Debug, Clone)]
pub enum Event {
    OrderFilled(Order),
    OrderCancelled(Order),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OrderFilled(_) => EventKind::OrderFilled,
            Event::OrderCancelled(_) => EventKind::OrderCancelled,
        }
    }
}

/// Event type used as the subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderFilled,
    OrderCancelled,
}

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    name: String,
    handler: Handler,
}

/// Process-wide publish/subscribe channel
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe a named async handler to an event kind
    pub async fn subscribe<F, Fut>(&self, kind: EventKind, name: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handler: Handler = Arc::new(
            move |event: Event| -> BoxFuture<'static, Result<()>> { Box::pin(handler(event)) },
        );
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(kind)
            .or_default()
            .push(Subscriber { name: name.clone(), handler });
        info!("Subscriber '{}' registered for {:?}", name, kind);
    }

    /// Publish an event to all subscribers: spawn every handler, await them
    /// all, log per-handler failures. Gather all, never fail fast.
    pub async fn publish(&self, event: Event) {
        let subscribers = {
            let map = self.subscribers.read().await;
            map.get(&event.kind()).cloned().unwrap_or_default()
        };

        if subscribers.is_empty() {
            return;
        }

        debug!(
            "Publishing {:?} to {} subscriber(s)",
            event.kind(),
            subscribers.len()
        );

        let mut tasks = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            let event = event.clone();
            let handler = Arc::clone(&subscriber.handler);
            tasks.push((
                subscriber.name,
                tokio::spawn(async move { handler(event).await }),
            ));
        }

        for (name, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Error in subscriber '{}': {}", name, e),
                Err(e) => error!("Subscriber '{}' panicked: {}", name, e),
            }
        }
    }

    /// Drop all subscribers
    pub async fn clear(&self) {
        self.subscribers.write().await.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
