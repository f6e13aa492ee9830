//! Bounded event queue and congestion policy.
//!
//! The queue sits between the stream reader (which offers frames as they
//! complete) and the drain loop (which polls them). Neither side ever waits
//! on the other: when the queue is full the reader drops frames instead of
//! blocking the transport, and the drain loop is told about the loss once.
//!
//! # Policy
//!
//! - A full queue drops the *incoming* frame, never the oldest one, and
//!   enters the congested state.
//! - While congested every offered frame is dropped.
//! - The drain loop empties the queue in FIFO order. The poll after the last
//!   buffered frame returns [`Polled::Congested`] exactly once and clears the
//!   flag. The consumer should treat its state as stale and resync.
//!
//! # Configuration
//!
//! - `capacity`: Maximum buffered frames (default: 24). Large enough for the
//!   burst of notifications sent right after a watch starts, small enough to
//!   keep memory bounded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::protocol::Frame;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 24;

/// Outcome of [`EventQueue::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The frame was appended to the tail.
    Queued,
    /// The queue was full; the frame was dropped and congestion began.
    Congested,
    /// The queue was already congested; the frame was dropped.
    Dropped,
    /// The subscription is gone; the frame was discarded.
    Closed,
}

/// Outcome of [`EventQueue::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled {
    /// The oldest buffered frame.
    Frame(Frame),
    /// The queue drained after congestion. Emitted once per congestion.
    Congested {
        /// Frames dropped during this congestion.
        dropped: usize,
    },
    /// Nothing to deliver.
    Empty,
}

/// Capacity-limited FIFO of frames with a congestion flag.
///
/// Not synchronized on its own; see [`SharedQueue`].
#[derive(Debug)]
pub struct EventQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
    congested: bool,
    dropped: usize,
    closed: bool,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` frames.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            congested: false,
            dropped: 0,
            closed: false,
        }
    }

    /// Offer a frame from the producer side. Never blocks.
    pub fn offer(&mut self, frame: Frame) -> Offer {
        if self.closed {
            return Offer::Closed;
        }

        if self.congested {
            self.dropped += 1;
            return Offer::Dropped;
        }

        if self.frames.len() >= self.capacity {
            self.congested = true;
            self.dropped = 1;
            return Offer::Congested;
        }

        self.frames.push_back(frame);
        Offer::Queued
    }

    /// Take the next item from the consumer side. Never blocks.
    pub fn poll(&mut self) -> Polled {
        if let Some(frame) = self.frames.pop_front() {
            return Polled::Frame(frame);
        }

        if self.congested {
            self.congested = false;
            let dropped = std::mem::take(&mut self.dropped);
            return Polled::Congested { dropped };
        }

        Polled::Empty
    }

    /// Number of buffered frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if no frames are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Maximum number of buffered frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if the queue is currently dropping frames.
    #[inline]
    pub fn is_congested(&self) -> bool {
        self.congested
    }

    /// Frames dropped since congestion began (zero when not congested).
    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Drop all buffered frames and reset the congestion state.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.congested = false;
        self.dropped = 0;
    }

    /// Release all buffered frames and refuse every later offer.
    pub fn close(&mut self) {
        self.clear();
        self.closed = true;
    }

    /// Check if the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// [`EventQueue`] shared between the reader task and the drain loop.
///
/// Every operation takes one short-lived lock that is never held across an
/// `.await`. Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct SharedQueue {
    inner: Arc<Mutex<EventQueue>>,
}

impl SharedQueue {
    /// Create a shared queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventQueue::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EventQueue> {
        // Queue state stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`EventQueue::offer`].
    pub fn offer(&self, frame: Frame) -> Offer {
        self.lock().offer(frame)
    }

    /// See [`EventQueue::poll`].
    pub fn poll(&self) -> Polled {
        self.lock().poll()
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of buffered frames.
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Check if the queue is currently dropping frames.
    pub fn is_congested(&self) -> bool {
        self.lock().is_congested()
    }

    /// Release all buffered frames.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// See [`EventQueue::close`].
    pub fn close(&self) {
        self.lock().close();
    }

    /// Check if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }
}

impl Default for SharedQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
