//! The consumer trait and its closure-based implementation.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::StreamError;

/// Boxed future returned by consumer callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Receiver of decoded events and stream conditions.
///
/// The returned futures are awaited by the drain loop before it polls the
/// queue again, so a consumer that never completes stalls delivery (but not
/// ingestion, which keeps running until the queue congests).
pub trait Consumer<E>: Send + Sync + 'static {
    /// Handle one decoded event.
    fn on_event(&self, event: E) -> BoxFuture<'static, ()>;

    /// Handle a transport failure, a decode failure or a congestion notice.
    fn on_error(&self, error: StreamError) -> BoxFuture<'static, ()>;
}

impl<E, C> Consumer<E> for Arc<C>
where
    C: Consumer<E> + ?Sized,
{
    fn on_event(&self, event: E) -> BoxFuture<'static, ()> {
        (**self).on_event(event)
    }

    fn on_error(&self, error: StreamError) -> BoxFuture<'static, ()> {
        (**self).on_error(error)
    }
}

/// Consumer built from an event closure and an error closure.
pub struct FnConsumer<E, FE, FutE, FX, FutX>
where
    FE: Fn(E) -> FutE + Send + Sync + 'static,
    FutE: Future<Output = ()> + Send + 'static,
    FX: Fn(StreamError) -> FutX + Send + Sync + 'static,
    FutX: Future<Output = ()> + Send + 'static,
{
    on_event: FE,
    on_error: FX,
    _phantom: PhantomData<fn(E) -> (FutE, FutX)>,
}

impl<E, FE, FutE, FX, FutX> FnConsumer<E, FE, FutE, FX, FutX>
where
    FE: Fn(E) -> FutE + Send + Sync + 'static,
    FutE: Future<Output = ()> + Send + 'static,
    FX: Fn(StreamError) -> FutX + Send + Sync + 'static,
    FutX: Future<Output = ()> + Send + 'static,
{
    /// Create a new closure-based consumer.
    pub fn new(on_event: FE, on_error: FX) -> Self {
        Self {
            on_event,
            on_error,
            _phantom: PhantomData,
        }
    }
}

impl<E, FE, FutE, FX, FutX> Consumer<E> for FnConsumer<E, FE, FutE, FX, FutX>
where
    E: 'static,
    FE: Fn(E) -> FutE + Send + Sync + 'static,
    FutE: Future<Output = ()> + Send + 'static,
    FX: Fn(StreamError) -> FutX + Send + Sync + 'static,
    FutX: Future<Output = ()> + Send + 'static,
{
    fn on_event(&self, event: E) -> BoxFuture<'static, ()> {
        Box::pin((self.on_event)(event))
    }

    fn on_error(&self, error: StreamError) -> BoxFuture<'static, ()> {
        Box::pin((self.on_error)(error))
    }
}

impl<E, FE, FutE, FX, FutX> std::fmt::Debug for FnConsumer<E, FE, FutE, FX, FutX>
where
    FE: Fn(E) -> FutE + Send + Sync + 'static,
    FutE: Future<Output = ()> + Send + 'static,
    FX: Fn(StreamError) -> FutX + Send + Sync + 'static,
    FutX: Future<Output = ()> + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnConsumer").finish_non_exhaustive()
    }
}

/// Shorthand for [`FnConsumer::new`].
pub fn consumer_fn<E, FE, FutE, FX, FutX>(
    on_event: FE,
    on_error: FX,
) -> FnConsumer<E, FE, FutE, FX, FutX>
where
    FE: Fn(E) -> FutE + Send + Sync + 'static,
    FutE: Future<Output = ()> + Send + 'static,
    FX: Fn(StreamError) -> FutX + Send + Sync + 'static,
    FutX: Future<Output = ()> + Send + 'static,
{
    FnConsumer::new(on_event, on_error)
}
