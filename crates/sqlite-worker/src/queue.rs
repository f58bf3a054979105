// crates/sqlite-worker/src/queue.rs
// ============================================================================
// Module: Request Queue
// Description: Bounded FIFO channel between caller threads and the executor.
// Purpose: Apply backpressure with a submission deadline and refuse work after
//          shutdown begins.
// Dependencies: crossbeam-channel, rusqlite, crate::registry
// ============================================================================

//! ## Overview
//! Producers are arbitrary caller threads; the sole consumer is the execution
//! loop. FIFO order is the only ordering guarantee.
//!
//! Invariants:
//! - Once [`RequestQueue::close`] is called, every later submission fails with
//!   [`WorkerError::EngineClosed`].
//! - A submission counts as in flight from before its closed check until its
//!   send returns, so a consumer that observes the queue closed, empty, and
//!   with nothing in flight has seen every accepted request.
//! - A full queue blocks the producer for at most the submission deadline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::Receiver;
use crossbeam_channel::SendTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::TryRecvError;
use crossbeam_channel::bounded;
use rusqlite::types::Value;

use crate::error::WorkerError;
use crate::registry::Token;
use crate::statement::StatementKind;

// ============================================================================
// SECTION: Messages
// ============================================================================

/// One statement submitted for execution.
///
/// # Invariants
/// - Immutable after submission; consumed exactly once by the executor.
#[derive(Debug)]
pub struct Request {
    /// Token identifying the request.
    pub token: Token,
    /// Statement text.
    pub statement: String,
    /// Bound parameters in positional order.
    pub params: Vec<Value>,
    /// Leading-keyword classification of `statement`.
    pub kind: StatementKind,
    /// Whether the caller retained a slot for the outcome.
    pub retain: bool,
    /// Submission instant, used for queue wait diagnostics.
    pub enqueued_at: Instant,
}

/// Messages carried by the queue.
#[derive(Debug)]
pub enum QueueMessage {
    /// Statement to execute.
    Request(Request),
    /// Sentinel asking the executor to drain and stop.
    Shutdown,
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// Producer side of the bounded request queue.
pub struct RequestQueue {
    /// Channel sender shared by all producers.
    sender: Sender<QueueMessage>,
    /// Fixed capacity.
    capacity: usize,
    /// Maximum time a producer waits for room.
    submit_timeout: Duration,
    /// Set once shutdown begins or the executor stops.
    closed: AtomicBool,
    /// Producers between their closed check and the end of their send.
    in_flight: AtomicUsize,
}

impl RequestQueue {
    /// Creates a queue and returns its consumer side.
    #[must_use]
    pub fn new(capacity: usize, submit_timeout: Duration) -> (Self, Receiver<QueueMessage>) {
        let (sender, receiver) = bounded(capacity);
        let queue = Self {
            sender,
            capacity,
            submit_timeout,
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        };
        (queue, receiver)
    }

    /// Enqueues `request`, waiting up to the submission deadline for room.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::EngineClosed`] after shutdown began or the
    /// executor stopped, and [`WorkerError::QueueFull`] when the deadline
    /// elapsed.
    pub fn submit(&self, request: Request) -> Result<(), WorkerError> {
        let _in_flight = InFlight::enter(&self.in_flight);
        if self.is_closed() {
            return Err(WorkerError::EngineClosed);
        }
        match self.sender.send_timeout(QueueMessage::Request(request), self.submit_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(WorkerError::QueueFull {
                capacity: self.capacity,
                waited_ms: u64::try_from(self.submit_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Err(SendTimeoutError::Disconnected(_)) => Err(WorkerError::EngineClosed),
        }
    }

    /// Marks the queue closed to new submissions.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the queue refuses submissions.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns `true` while some producer may still deliver a request.
    #[must_use]
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Enqueues the shutdown sentinel behind every accepted request.
    ///
    /// Blocks while the queue is full; returns immediately if the executor
    /// already stopped.
    pub fn send_shutdown(&self) {
        // A disconnected channel means the executor is already gone.
        let _ = self.sender.send(QueueMessage::Shutdown);
    }

    /// Returns the number of messages currently queued (advisory).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.sender.len()
    }
}

// ============================================================================
// SECTION: In-Flight Tracking
// ============================================================================

/// Marks one producer in flight until dropped.
struct InFlight<'a> {
    /// Shared in-flight counter.
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    /// Increments `counter` for the guard's lifetime.
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Remaining Requests
// ============================================================================

/// Takes the next request left behind after `queue` was closed.
///
/// Waits out producers still in flight; returns `None` once the queue is
/// empty and no producer can add to it. Shutdown sentinels are skipped.
pub fn next_remaining(queue: &RequestQueue, receiver: &Receiver<QueueMessage>) -> Option<Request> {
    loop {
        // Read before polling: a producer that leaves after this point has
        // already sent, and any later one sees the queue closed.
        let idle = !queue.has_in_flight();
        match receiver.try_recv() {
            Ok(QueueMessage::Request(request)) => return Some(request),
            Ok(QueueMessage::Shutdown) => {}
            Err(TryRecvError::Empty) if !idle => thread::yield_now(),
            Err(_) => return None,
        }
    }
}
