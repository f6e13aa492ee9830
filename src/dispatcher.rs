//! Stream dispatcher: reader task, drain loop and subscription lifecycle.
//!
//! A [`StreamDispatcher`] owns one subscription:
//! 1. A reader task reads the byte stream, cuts frames and offers them to
//!    the bounded queue
//! 2. A drain task polls the queue, decodes each record and calls the
//!    consumer, one call at a time
//! 3. `cancel()` aborts the reader (closing the stream) and stops the drain
//!    loop at its next wake
//!
//! The two tasks only share the queue. The reader never waits for the
//! consumer; when the consumer falls behind, frames are dropped and the
//! consumer receives a single [`StreamError::QueueCongested`] once the
//! backlog has been delivered.
//!
//! # Example
//!
//! ```ignore
//! use ipnbus_client::consumer::channel;
//! use ipnbus_client::ipn::Notify;
//! use ipnbus_client::StreamDispatcher;
//!
//! let (consumer, mut rx) = channel(16);
//! let dispatcher = StreamDispatcher::<Notify>::builder()
//!     .capacity(32)
//!     .build();
//! dispatcher.start(stream, consumer)?;
//!
//! while let Some(message) = rx.recv().await {
//!     println!("{:?}", message);
//! }
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::backpressure::{Offer, Polled, SharedQueue};
use crate::codec::JsonCodec;
use crate::config::BusConfig;
use crate::consumer::Consumer;
use crate::error::{BusError, Result, StreamError};
use crate::protocol::{Frame, FrameBuffer, FrameMode};
use crate::transport::{Transport, WatchRequest};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Lifecycle state of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Not started yet.
    Idle,
    /// Reading and delivering.
    Running,
    /// Terminal: cancelled, or ended after reporting a transport failure.
    Cancelled,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            IDLE => DispatcherState::Idle,
            RUNNING => DispatcherState::Running,
            _ => DispatcherState::Cancelled,
        }
    }
}

/// Builder for configuring a [`StreamDispatcher`].
#[derive(Debug, Clone, Default)]
pub struct DispatcherBuilder {
    config: BusConfig,
}

impl DispatcherBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue capacity.
    ///
    /// Default: 24
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set how long the drain loop sleeps on an empty queue.
    ///
    /// Default: 100ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the transport read buffer size.
    ///
    /// Default: 64KB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the largest incomplete record tolerated.
    ///
    /// Default: 16MB
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set how records are grouped into frames.
    ///
    /// Default: [`FrameMode::Record`]
    pub fn frame_mode(mut self, mode: FrameMode) -> Self {
        self.config.frame_mode = mode;
        self
    }

    /// Forward decode failures to the consumer (they are always logged).
    ///
    /// Default: true
    pub fn report_decode_errors(mut self, report: bool) -> Self {
        self.config.report_decode_errors = report;
        self
    }

    /// Build an idle dispatcher for events of type `E`.
    pub fn build<E>(self) -> StreamDispatcher<E>
    where
        E: DeserializeOwned + Send + 'static,
    {
        StreamDispatcher::new(self.config)
    }
}

/// State shared by the dispatcher handle, the reader task and the drain task.
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    queue: SharedQueue,
    /// Set once by the reader when the stream ends or fails.
    failure: Mutex<Option<BusError>>,
    /// Wakes a sleeping drain loop on cancellation.
    wake: Notify,
    /// Flips to true when the drain loop has exited.
    done: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Move Running -> Cancelled. Returns false if someone else got there first.
    fn finish(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_failure(&self, error: BusError) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        failure.get_or_insert(error);
    }

    fn has_failure(&self) -> bool {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn take_failure(&self) -> Option<BusError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Consumes one bus subscription and delivers typed events to a consumer.
///
/// Dropping the dispatcher cancels the subscription.
pub struct StreamDispatcher<E> {
    config: BusConfig,
    shared: Arc<Shared>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    _event: PhantomData<fn() -> E>,
}

impl<E> StreamDispatcher<E>
where
    E: DeserializeOwned + Send + 'static,
{
    /// Create a dispatcher builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Create an idle dispatcher with the given configuration.
    pub fn new(config: BusConfig) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(IDLE),
                queue: SharedQueue::new(config.capacity),
                failure: Mutex::new(None),
                wake: Notify::new(),
                done,
            }),
            config,
            reader_task: Mutex::new(None),
            _event: PhantomData,
        }
    }

    /// Start consuming `stream`, delivering to `consumer`.
    ///
    /// Spawns the reader and drain tasks, so it must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `BusError::AlreadyStarted` unless the dispatcher is idle. A
    /// cancelled dispatcher cannot be restarted; build a new one.
    pub fn start<S, C>(&self, stream: S, consumer: C) -> Result<()>
    where
        S: AsyncRead + Send + Unpin + 'static,
        C: Consumer<E>,
    {
        self.shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BusError::AlreadyStarted)?;

        tracing::debug!(
            "Starting bus dispatcher (capacity {}, poll interval {:?})",
            self.shared.queue.capacity(),
            self.config.poll_interval
        );

        let frames = FrameBuffer::with_options(self.config.frame_mode, self.config.max_frame_size);
        let reader = tokio::spawn(read_loop(
            stream,
            frames,
            self.config.read_buffer_size,
            self.shared.clone(),
        ));
        *self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reader);

        tokio::spawn(drain_loop::<E, C>(
            self.shared.clone(),
            consumer,
            self.config.poll_interval,
            self.config.report_decode_errors,
        ));

        Ok(())
    }
}

impl<E> StreamDispatcher<E> {
    /// Cancel the subscription.
    ///
    /// Closes the stream, releases queued frames and stops the drain loop.
    /// A consumer call already in progress is allowed to finish; no further
    /// calls are made. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        let previous = self.shared.state.swap(CANCELLED, Ordering::AcqRel);
        if previous == CANCELLED {
            return;
        }

        if let Some(task) = self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.shared.queue.close();
        self.shared.wake.notify_one();

        if previous == IDLE {
            self.shared.done.send_replace(true);
        }
        tracing::debug!("Bus dispatcher cancelled");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    /// Check if the queue is currently dropping frames.
    pub fn is_congested(&self) -> bool {
        self.shared.queue.is_congested()
    }

    /// Number of frames waiting for the drain loop.
    pub fn queued_frames(&self) -> usize {
        self.shared.queue.len()
    }

    /// The configuration this dispatcher was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Wait until the drain loop has exited.
    ///
    /// Resolves after `cancel()` once any in-flight consumer call has
    /// finished, or after a transport failure has been reported. Returns
    /// immediately for a dispatcher that was never started.
    pub async fn closed(&self) {
        let mut done = self.shared.done.subscribe();
        if self.state() == DispatcherState::Idle {
            return;
        }
        // The sender lives in `self.shared`, so this cannot fail.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl<E> Drop for StreamDispatcher<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<E> std::fmt::Debug for StreamDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDispatcher")
            .field("state", &self.shared.state())
            .field("queued", &self.shared.queue.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Open a watch request and start delivering its events.
///
/// Returns the running dispatcher; drop it or call `cancel()` to
/// unsubscribe. Reconnecting after a transport failure (or resyncing after
/// congestion, with [`WatchOpts::for_resync`](crate::ipn::WatchOpts::for_resync))
/// is up to the caller.
pub async fn watch_ipn_bus<E, T, C>(
    transport: &T,
    request: &WatchRequest,
    consumer: C,
    config: BusConfig,
) -> Result<StreamDispatcher<E>>
where
    E: DeserializeOwned + Send + 'static,
    T: Transport + ?Sized,
    C: Consumer<E>,
{
    let stream = transport.open(request).await?;
    let dispatcher = StreamDispatcher::new(config);
    dispatcher.start(stream, consumer)?;
    Ok(dispatcher)
}

/// Reader task: bytes -> frames -> queue.
async fn read_loop<S>(mut stream: S, mut frames: FrameBuffer, buffer_size: usize, shared: Arc<Shared>)
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; buffer_size.max(1)];

    let failure = loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break BusError::ConnectionClosed,
            Ok(n) => n,
            Err(e) => break BusError::Io(e),
        };

        let completed = match frames.push(&buf[..n]) {
            Ok(completed) => completed,
            Err(e) => break e,
        };

        for frame in completed {
            match shared.queue.offer(frame) {
                Offer::Queued | Offer::Dropped => {}
                Offer::Congested => {
                    tracing::warn!(
                        "Event queue full ({} frames), dropping events until it drains",
                        shared.queue.capacity()
                    );
                }
                // Cancelled while this batch was being offered
                Offer::Closed => return,
            }
        }
    };

    if !frames.is_empty() {
        tracing::debug!("Discarding {} bytes of incomplete record", frames.len());
    }

    if !shared.is_running() {
        return;
    }
    tracing::warn!("Bus stream ended: {}", failure);
    shared.set_failure(failure);
}

/// Drain task: queue -> decode -> consumer.
async fn drain_loop<E, C>(
    shared: Arc<Shared>,
    consumer: C,
    poll_interval: Duration,
    report_decode_errors: bool,
) where
    E: DeserializeOwned + Send + 'static,
    C: Consumer<E>,
{
    tracing::debug!("Watching event queue");

    while shared.is_running() {
        // Read before polling: the reader records its failure only after
        // its last offer, so an empty poll after this means fully drained.
        let failed = shared.has_failure();

        match shared.queue.poll() {
            Polled::Frame(frame) => {
                deliver_frame(&shared, &consumer, &frame, report_decode_errors).await;
            }
            Polled::Congested { dropped } => {
                tracing::warn!(
                    "Event queue drained after congestion, {} frames dropped",
                    dropped
                );
                if !shared.is_running() {
                    break;
                }
                consumer.on_error(StreamError::QueueCongested).await;
            }
            Polled::Empty if failed => {
                let failure = shared.take_failure().unwrap_or(BusError::ConnectionClosed);
                if shared.finish() {
                    consumer
                        .on_error(StreamError::Transport(Arc::new(failure)))
                        .await;
                }
                break;
            }
            Polled::Empty => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }

    shared.done.send_replace(true);
    tracing::debug!("Stopped watching event queue");
}

/// Decode every record in `frame` and deliver them in order.
async fn deliver_frame<E, C>(shared: &Shared, consumer: &C, frame: &Frame, report_decode_errors: bool)
where
    E: DeserializeOwned + Send + 'static,
    C: Consumer<E>,
{
    for record in frame.records() {
        let decoded = JsonCodec::decode::<E>(record);
        if !shared.is_running() {
            return;
        }

        match decoded {
            Ok(event) => consumer.on_event(event).await,
            Err(e) => {
                tracing::warn!("Failed to decode event: {}", e);
                if report_decode_errors {
                    consumer.on_error(StreamError::Decode(Arc::new(e))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{channel, BusMessage};
    use serde_json::{json, Value};
    use tokio::io::{duplex, AsyncWriteExt};

    fn fast() -> DispatcherBuilder {
        StreamDispatcher::<Value>::builder().poll_interval(Duration::from_millis(5))
    }

    async fn next(rx: &mut tokio::sync::mpsc::Receiver<BusMessage<Value>>) -> BusMessage<Value> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for consumer call")
            .expect("consumer dropped")
    }

    async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<BusMessage<Value>>) -> Value {
        match next(rx).await {
            BusMessage::Event(event) => event,
            BusMessage::Error(e) => panic!("expected event, got error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_delivers_events_in_order_across_chunks() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().build::<Value>();
        dispatcher.start(stream, consumer).unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Running);

        writer.write_all(b"{\"n\":1}\n{\"n\"").await.unwrap();
        writer.write_all(b":2}\n").await.unwrap();

        assert_eq!(next_event(&mut rx).await, json!({"n": 1}));
        assert_eq!(next_event(&mut rx).await, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_batched_frame_delivers_each_document() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().frame_mode(FrameMode::Batch).build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer
            .write_all(b"{\"doc\":\"first\"}\n{\"doc\":\"second\"}\n")
            .await
            .unwrap();

        assert_eq!(next_event(&mut rx).await, json!({"doc": "first"}));
        assert_eq!(next_event(&mut rx).await, json!({"doc": "second"}));
    }

    #[tokio::test]
    async fn test_deliver_frame_splits_documents() {
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().build::<Value>();
        dispatcher.shared.state.store(RUNNING, Ordering::Release);

        let frame = Frame::from("{\"a\":1}\n{\"b\":2}\n");
        deliver_frame::<Value, _>(&dispatcher.shared, &consumer, &frame, true).await;

        assert_eq!(next_event(&mut rx).await, json!({"a": 1}));
        assert_eq!(next_event(&mut rx).await, json!({"b": 2}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_decode_failure_is_not_fatal() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().frame_mode(FrameMode::Batch).build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer
            .write_all(b"{not json}\n{\"ok\":true}\n")
            .await
            .unwrap();

        assert!(matches!(
            next(&mut rx).await,
            BusMessage::Error(StreamError::Decode(_))
        ));
        assert_eq!(next_event(&mut rx).await, json!({"ok": true}));
        assert_eq!(dispatcher.state(), DispatcherState::Running);
    }

    #[tokio::test]
    async fn test_decode_failure_can_be_silenced() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().report_decode_errors(false).build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer.write_all(b"garbage\n{\"ok\":1}\n").await.unwrap();

        assert_eq!(next_event(&mut rx).await, json!({"ok": 1}));
    }

    #[tokio::test]
    async fn test_end_of_stream_reported_once_after_backlog() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer.write_all(b"{\"last\":1}\n{\"partial\":").await.unwrap();
        drop(writer);

        assert_eq!(next_event(&mut rx).await, json!({"last": 1}));
        match next(&mut rx).await {
            BusMessage::Error(StreamError::Transport(e)) => {
                assert!(matches!(*e, BusError::ConnectionClosed));
            }
            other => panic!("expected transport failure, got {:?}", other),
        }

        dispatcher.closed().await;
        assert_eq!(dispatcher.state(), DispatcherState::Cancelled);
        // The drain loop dropped the consumer: nothing else is coming
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_oversized_record_fails_stream() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().max_frame_size(16).build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer
            .write_all(b"{\"this record\":\"has no end")
            .await
            .unwrap();

        match next(&mut rx).await {
            BusMessage::Error(StreamError::Transport(e)) => {
                assert!(matches!(*e, BusError::Protocol(_)));
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_congestion_drops_newest_and_signals_once() {
        let (mut writer, stream) = duplex(4096);
        // Channel of one: the drain loop stalls as soon as we stop receiving
        let (consumer, mut rx) = channel(1);
        let dispatcher = fast().capacity(2).build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        writer.write_all(b"{\"n\":1}\n").await.unwrap();
        assert_eq!(next_event(&mut rx).await, json!({"n": 1}));

        let burst: Vec<u8> = (2..=10)
            .flat_map(|n| format!("{{\"n\":{}}}\n", n).into_bytes())
            .collect();
        writer.write_all(&burst).await.unwrap();

        while !dispatcher.is_congested() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(next_event(&mut rx).await, json!({"n": 2}));
        assert_eq!(next_event(&mut rx).await, json!({"n": 3}));
        assert!(matches!(
            next(&mut rx).await,
            BusMessage::Error(StreamError::QueueCongested)
        ));

        // Accepting again after the notice
        writer.write_all(b"{\"n\":11}\n").await.unwrap();
        assert_eq!(next_event(&mut rx).await, json!({"n": 11}));
        assert!(!dispatcher.is_congested());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_silences_consumer() {
        let (mut writer, stream) = duplex(1024);
        let (consumer, mut rx) = channel(16);
        let dispatcher = fast().build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        dispatcher.cancel();
        dispatcher.cancel();
        assert_eq!(dispatcher.state(), DispatcherState::Cancelled);

        dispatcher.closed().await;
        // The stream was closed by cancellation
        let _ = writer.write_all(b"{\"late\":1}\n").await;

        assert!(rx.recv().await.is_none());
        assert_eq!(dispatcher.queued_frames(), 0);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_call_finish_then_stops() {
        let (mut writer, stream) = duplex(4096);
        // Channel of one: the drain loop blocks on the second event
        let (consumer, mut rx) = channel(1);
        let dispatcher = fast().build::<Value>();
        dispatcher.start(stream, consumer).unwrap();

        let backlog: Vec<u8> = (1..=5)
            .flat_map(|n| format!("{{\"n\":{}}}\n", n).into_bytes())
            .collect();
        writer.write_all(&backlog).await.unwrap();

        // One event buffered in the channel, one in flight, three queued
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.queued_frames() != 3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("drain loop never stalled");

        dispatcher.cancel();
        assert_eq!(dispatcher.queued_frames(), 0);

        assert_eq!(next_event(&mut rx).await, json!({"n": 1}));
        assert_eq!(next_event(&mut rx).await, json!({"n": 2}));
        assert!(rx.recv().await.is_none());
        dispatcher.closed().await;
    }

    #[tokio::test]
    async fn test_reader_stops_offering_once_cancelled() {
        let dispatcher = fast().build::<Value>();
        dispatcher.shared.state.store(RUNNING, Ordering::Release);

        let (mut writer, stream) = duplex(4096);
        writer.write_all(b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n").await.unwrap();
        // Cancelled after the bytes arrived but before the reader offered them
        dispatcher.cancel();

        let frames = FrameBuffer::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            read_loop(stream, frames, 1024, dispatcher.shared.clone()),
        )
        .await
        .expect("reader kept running after the queue was closed");

        assert_eq!(dispatcher.queued_frames(), 0);
        assert!(!dispatcher.shared.has_failure());
        drop(writer);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_during_burst_leaves_queue_empty() {
        let (mut writer, stream) = duplex(1 << 20);
        let (consumer, _rx) = channel(1);
        let dispatcher = fast()
            .capacity(100_000)
            .read_buffer_size(1 << 20)
            .build::<Value>();

        let burst: Vec<u8> = (0..50_000)
            .flat_map(|n| format!("{{\"n\":{}}}\n", n).into_bytes())
            .collect();
        let feeder = tokio::spawn(async move {
            let _ = writer.write_all(&burst).await;
            writer
        });

        dispatcher.start(stream, consumer).unwrap();
        tokio::time::sleep(Duration::from_micros(300)).await;
        dispatcher.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.queued_frames(), 0);
        feeder.abort();
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let dispatcher = fast().build::<Value>();
        dispatcher.cancel();

        dispatcher.closed().await;
        let (_writer, stream) = duplex(64);
        let (consumer, _rx) = channel(1);
        assert!(matches!(
            dispatcher.start(stream, consumer),
            Err(BusError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let dispatcher = fast().build::<Value>();
        let (_w1, s1) = duplex(64);
        let (_w2, s2) = duplex(64);
        let (c1, _rx1) = channel(1);
        let (c2, _rx2) = channel(1);

        dispatcher.start(s1, c1).unwrap();
        assert!(matches!(
            dispatcher.start(s2, c2),
            Err(BusError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_closed_returns_immediately_when_idle() {
        let dispatcher = fast().build::<Value>();
        dispatcher.closed().await;
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }

    #[test]
    fn test_builder_configuration() {
        let dispatcher = StreamDispatcher::<Value>::builder()
            .capacity(8)
            .poll_interval(Duration::from_millis(20))
            .read_buffer_size(512)
            .max_frame_size(1024)
            .frame_mode(FrameMode::Batch)
            .report_decode_errors(false)
            .build::<Value>();

        let config = dispatcher.config();
        assert_eq!(config.capacity, 8);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.read_buffer_size, 512);
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.frame_mode, FrameMode::Batch);
        assert!(!config.report_decode_errors);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
    }
}
