//! Consumer that forwards into a bounded mpsc channel.
//!
//! Useful when the receiving side wants to `select!` over bus traffic
//! alongside other work. The channel is bounded: when it is full the drain
//! loop waits, and the event queue absorbs (and eventually drops) new frames.

use tokio::sync::mpsc;

use super::{BoxFuture, Consumer};
use crate::error::StreamError;

/// An item delivered through a [`ChannelConsumer`].
#[derive(Debug, Clone)]
pub enum BusMessage<E> {
    /// A decoded event.
    Event(E),
    /// A stream condition.
    Error(StreamError),
}

impl<E> BusMessage<E> {
    /// Return the event, if this is one.
    pub fn into_event(self) -> Option<E> {
        match self {
            BusMessage::Event(event) => Some(event),
            BusMessage::Error(_) => None,
        }
    }

    /// Return the error, if this is one.
    pub fn into_error(self) -> Option<StreamError> {
        match self {
            BusMessage::Event(_) => None,
            BusMessage::Error(error) => Some(error),
        }
    }
}

/// Consumer that sends every callback into an mpsc channel.
#[derive(Debug)]
pub struct ChannelConsumer<E> {
    tx: mpsc::Sender<BusMessage<E>>,
}

/// Create a channel consumer and the receiver it feeds.
pub fn channel<E: Send + 'static>(
    capacity: usize,
) -> (ChannelConsumer<E>, mpsc::Receiver<BusMessage<E>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelConsumer { tx }, rx)
}

impl<E: Send + 'static> ChannelConsumer<E> {
    fn forward(&self, message: BusMessage<E>) -> BoxFuture<'static, ()> {
        let tx = self.tx.clone();
        Box::pin(async move {
            if tx.send(message).await.is_err() {
                tracing::debug!("Bus receiver dropped, discarding message");
            }
        })
    }
}

impl<E: Send + 'static> Consumer<E> for ChannelConsumer<E> {
    fn on_event(&self, event: E) -> BoxFuture<'static, ()> {
        self.forward(BusMessage::Event(event))
    }

    fn on_error(&self, error: StreamError) -> BoxFuture<'static, ()> {
        self.forward(BusMessage::Error(error))
    }
}
