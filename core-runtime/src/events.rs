//! # Event Bus System
//!
//! Typed, broadcast-based events for the sync core.
//!
//! ## Overview
//!
//! The orchestrator publishes [`SyncEvent`]s for each session and the
//! service publishes [`LibraryEvent`]s when the local store changes shape.
//! Both go through one [`EventBus`], a cloneable `broadcast` sender.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         session_id: "session-1".to_string(),
//!         mode: "chunked".to_string(),
//!         mirror: false,
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! Every variant serializes as `{"type": "Sync", "payload": {"event": "Progress", ...}}`
//! so hosts can forward events over a bridge without a schema of their own.
//!
//! A subscriber that falls more than the buffer size behind gets
//! `RecvError::Lagged(n)` and then continues with newer events. Progress
//! consumers that only care about the latest snapshot use the orchestrator's
//! `watch`-based subscription instead, which never lags.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync session events
    Sync(SyncEvent),
    /// Local store and index events
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Session the event belongs to; library events have none.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Sync(
                SyncEvent::Started { session_id, .. }
                | SyncEvent::Progress { session_id, .. }
                | SyncEvent::SweepCompleted { session_id, .. }
                | SyncEvent::Completed { session_id, .. }
                | SyncEvent::Failed { session_id, .. },
            ) => Some(session_id),
            CoreEvent::Library(_) => None,
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the sync orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A session was started.
    Started {
        session_id: String,
        /// Strategy that will run (`bulk`, `chunked`, `per_file`, ...).
        mode: String,
        /// Whether the mirror sweep was requested.
        mirror: bool,
    },
    /// Throttled progress update.
    Progress {
        session_id: String,
        processed: u64,
        /// Expected total, when the strategy knows it.
        total: Option<u64>,
        /// Progress percentage (0-100).
        percent: u8,
        /// Current unit of work (collection or file name).
        phase: String,
    },
    /// The mirror sweep finished.
    SweepCompleted {
        session_id: String,
        deleted: u64,
        /// Set when the sweep ran although some units failed.
        partial: bool,
    },
    /// Session finished successfully.
    Completed {
        session_id: String,
        records_written: u64,
        records_unchanged: u64,
        records_deleted: u64,
        failed_units: u64,
        duration_secs: u64,
    },
    /// Session ended with an error.
    Failed {
        session_id: String,
        message: String,
        processed: u64,
        /// Whether retrying the session later can succeed.
        recoverable: bool,
    },
}

impl SyncEvent {
    /// `Completed` and `Failed` end a session; nothing with the same
    /// session id follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncEvent::Completed { .. } | SyncEvent::Failed { .. })
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to the local record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A freshly built search index snapshot is now serving queries.
    IndexRebuilt {
        records: u64,
        suffix_keys: u64,
        chassis_buckets: u64,
    },
    /// Every local record was removed.
    StoreCleared { removed: u64 },
}

// ============================================================================
// Event Bus
// ============================================================================

/// Shared publisher. Clones send into the same channel; each
/// [`subscribe`](Self::subscribe) call gets its own receiver.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// `capacity` is the number of events buffered per subscriber before it
    /// starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Errors only when nobody is subscribed, which publishers ignore with
    /// `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A receiver that skips events rejected by its filter.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let mut stream = EventStream::new(event_bus.subscribe()).for_session("session-7");
/// assert!(stream.try_recv().is_none());
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events of one sync session.
    pub fn for_session(self, session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        self.filter(move |event| event.session_id() == Some(session_id.as_str()))
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// `None` when nothing acceptable is buffered right now.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        use broadcast::error::TryRecvError;

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(n)) => return Some(Err(RecvError::Lagged(n))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
