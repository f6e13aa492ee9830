//! Fan-out decorator over several consumers.
//!
//! The dispatcher only knows one consumer. `Fanout` is that consumer and
//! forwards each call to every registered consumer in registration order,
//! awaiting each before moving on, so the one-call-at-a-time guarantee
//! holds for every downstream consumer too.

use std::sync::Arc;

use super::{BoxFuture, Consumer};
use crate::error::StreamError;

/// Consumer that forwards to a list of consumers.
pub struct Fanout<E> {
    consumers: Vec<Arc<dyn Consumer<E>>>,
}

impl<E: Clone + Send + 'static> Fanout<E> {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
        }
    }

    /// Add a consumer (builder style).
    pub fn with<C: Consumer<E>>(mut self, consumer: C) -> Self {
        self.push(consumer);
        self
    }

    /// Add a consumer.
    pub fn push<C: Consumer<E>>(&mut self, consumer: C) {
        self.consumers.push(Arc::new(consumer));
    }

    /// Number of registered consumers.
    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    /// Check if no consumers are registered.
    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

impl<E: Clone + Send + 'static> Default for Fanout<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Fanout<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("consumers", &self.consumers.len())
            .finish()
    }
}

impl<E: Clone + Send + 'static> Consumer<E> for Fanout<E> {
    fn on_event(&self, event: E) -> BoxFuture<'static, ()> {
        let consumers = self.consumers.clone();
        Box::pin(async move {
            for consumer in &consumers {
                consumer.on_event(event.clone()).await;
            }
        })
    }

    fn on_error(&self, error: StreamError) -> BoxFuture<'static, ()> {
        let consumers = self.consumers.clone();
        Box::pin(async move {
            for consumer in &consumers {
                consumer.on_error(error.clone()).await;
            }
        })
    }
}
