//! Cancellable run event streams
//!
//! A streaming run is a bounded mpsc channel plus a shared cancel flag:
//!
//! ```text
//!   producer task ──EventSender──▶ [ channel ] ──RunStream──▶ orchestrator
//!          ▲                                          │
//!          └────────────── CancelHandle ◀─────────────┘
//! ```
//!
//! The producer checks the flag before every emission, including the
//! terminal one. The consumer stops yielding as soon as the flag is set, so
//! nothing is observed after `cancel()` returns.

use std::sync::Arc;
use std::time::Duration;

use canvas_model::StreamEvent;
use futures::Stream;
use tokio::sync::{mpsc, watch};

/// Events buffered between producer and consumer
const CHANNEL_CAPACITY: usize = 32;

/// Shared, idempotent cancellation flag
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// New, not-cancelled handle
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Request cancellation
    ///
    /// Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.flag.send_replace(true)
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolve once cancellation is requested
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half of a run stream
///
/// Enforces the lifecycle ordering: the first event must be `Hello` and
/// nothing is sent after a terminal event.
#[derive(Debug)]
pub struct EventSender {
    tx: mpsc::Sender<StreamEvent>,
    cancel: CancelHandle,
    hello_sent: bool,
    finished: bool,
}

impl EventSender {
    /// Emit an event
    ///
    /// Returns `false` when the event was not delivered: the run was
    /// cancelled, the consumer is gone, the stream already terminated, or the
    /// event would break the lifecycle ordering.
    pub async fn emit(&mut self, event: StreamEvent) -> bool {
        if self.finished || self.cancel.is_cancelled() {
            return false;
        }
        let is_hello = matches!(event, StreamEvent::Hello { .. });
        if is_hello == self.hello_sent {
            tracing::warn!(event = event.name(), "dropping out-of-order stream event");
            return false;
        }
        let terminal = event.is_terminal();
        if self.tx.send(event).await.is_err() {
            self.finished = true;
            return false;
        }
        self.hello_sent = true;
        self.finished = terminal;
        true
    }

    /// Sleep unless cancelled first; returns `false` on cancellation
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(duration) => !self.cancel.is_cancelled(),
        }
    }

    /// Whether the consumer cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once the consumer cancels
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Whether a `Hello` has been delivered
    #[must_use]
    pub fn hello_sent(&self) -> bool {
        self.hello_sent
    }

    /// Whether a terminal event has been delivered
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Consumer half of a run stream
#[derive(Debug)]
pub struct RunStream {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancelHandle,
    finished: bool,
}

impl RunStream {
    /// Create a connected sender/stream pair
    #[must_use]
    pub fn channel() -> (EventSender, RunStream) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancelHandle::new();
        let sender = EventSender {
            tx,
            cancel: cancel.clone(),
            hello_sent: false,
            finished: false,
        };
        let stream = RunStream {
            rx,
            cancel,
            finished: false,
        };
        (sender, stream)
    }

    /// A stream that yields the given events then ends
    ///
    /// Events are delivered verbatim; no ordering is enforced.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = StreamEvent>) -> Self {
        let events: Vec<StreamEvent> = events.into_iter().collect();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Self {
            rx,
            cancel: CancelHandle::new(),
            finished: false,
        }
    }

    /// Next event; `None` after cancellation, after a terminal event, or
    /// when the producer went away
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }
        let event = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        };
        match event {
            Some(event) if !self.cancel.is_cancelled() => {
                self.finished = event.is_terminal();
                Some(event)
            }
            _ => {
                self.finished = true;
                None
            }
        }
    }

    /// Cancel the run; idempotent
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            tracing::debug!("run stream cancelled");
        }
    }

    /// Handle that cancels this stream from elsewhere
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}

impl Drop for RunStream {
    fn drop(&mut self) {
        // A dropped consumer stops the producer at its next emission.
        self.cancel.cancel();
    }
}
