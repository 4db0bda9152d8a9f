//! # Event Bus System
//!
//! Typed publish/subscribe channel between the sync engine and whatever
//! supervises it, built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps [`ScanEvent`] (progress snapshots
//!   pushed on every reporter mutation) and [`LibraryEvent`] (catalog changes).
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//! - **ControlMessage**: Requests flowing the other way, from the controller
//!   to the running session.
//!
//! ## Wire format
//!
//! Events serialise as `{"type": "Scan", "payload": {"event": "SCAN_TASKS", ...}}`.
//! Every `Scan` payload is an authoritative snapshot of one sequence, never a
//! delta, so a controller can drop any number of events and still converge.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Library(LibraryEvent::WorkAdded { id: 123 }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Work added to catalog");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; scan snapshots make the next event sufficient to catch up.
//! - **`RecvError::Closed`**: All senders have been dropped. Treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::logging::LogLevel;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scan progress snapshots
    Scan(ScanEvent),
    /// Catalog changes
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Scan(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Scan(ScanEvent::FailedTasks { .. }) => EventSeverity::Warning,
            CoreEvent::Scan(ScanEvent::Finished { .. }) => EventSeverity::Info,
            CoreEvent::Library(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Scan progress
// ============================================================================

/// Terminal outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskResult {
    Added,
    Failed,
    Updated,
    Skipped,
}

impl TaskResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskResult::Added => "added",
            TaskResult::Failed => "failed",
            TaskResult::Updated => "updated",
            TaskResult::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log line, attached either to a task or to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Progress record for one in-flight item, keyed by its work code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    pub code: String,
    pub logs: Vec<LogLine>,
    pub result: Option<TaskResult>,
}

impl ScanTask {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            logs: Vec::new(),
            result: None,
        }
    }
}

/// Append-only observability record of a finished task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub code: String,
    pub result: TaskResult,
    /// Running total for `result` at the time the entry was appended.
    pub count: u32,
}

/// Per-run aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub added: u32,
    pub failed: u32,
    pub skipped: u32,
    pub updated: u32,
}

impl ScanCounts {
    /// Increment the counter for `result` and return its new value.
    pub fn record(&mut self, result: TaskResult) -> u32 {
        let slot = match result {
            TaskResult::Added => &mut self.added,
            TaskResult::Failed => &mut self.failed,
            TaskResult::Updated => &mut self.updated,
            TaskResult::Skipped => &mut self.skipped,
        };
        *slot += 1;
        *slot
    }
}

/// Full reporter state, answered to `SCAN_INIT_STATE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub tasks: Vec<ScanTask>,
    pub failed_tasks: Vec<ScanTask>,
    pub results: Vec<ResultEntry>,
    pub main_logs: Vec<LogLine>,
}

/// Progress events pushed to the supervising controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ScanEvent {
    #[serde(rename = "SCAN_INIT_STATE")]
    InitState { snapshot: ScanSnapshot },
    #[serde(rename = "SCAN_TASKS")]
    Tasks { tasks: Vec<ScanTask> },
    #[serde(rename = "SCAN_FAILED_TASKS")]
    FailedTasks { failed_tasks: Vec<ScanTask> },
    #[serde(rename = "SCAN_RESULTS")]
    Results { results: Vec<ResultEntry> },
    #[serde(rename = "SCAN_MAIN_LOGS")]
    MainLogs { main_logs: Vec<LogLine> },
    #[serde(rename = "SCAN_FINISHED")]
    Finished { message: String, counts: ScanCounts },
}

impl ScanEvent {
    fn description(&self) -> &str {
        match self {
            ScanEvent::InitState { .. } => "Scan state snapshot",
            ScanEvent::Tasks { .. } => "Active tasks changed",
            ScanEvent::FailedTasks { .. } => "Failed tasks changed",
            ScanEvent::Results { .. } => "Results changed",
            ScanEvent::MainLogs { .. } => "Main log changed",
            ScanEvent::Finished { .. } => "Scan finished",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to catalog content changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// New work inserted.
    WorkAdded { id: u32 },
    /// Existing work refreshed.
    WorkUpdated {
        id: u32,
        /// Column groups that were rewritten (e.g. "dynamic", "tags", "vas").
        fields: Vec<String>,
    },
    /// Work removed by cleanup.
    WorkRemoved { id: u32 },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::WorkAdded { .. } => "Work added to catalog",
            LibraryEvent::WorkUpdated { .. } => "Work metadata updated",
            LibraryEvent::WorkRemoved { .. } => "Work removed from catalog",
        }
    }
}

// ============================================================================
// Controller requests
// ============================================================================

/// Requests the supervising controller sends to a running session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ControlMessage {
    /// Ask for a full snapshot (controller attached mid-run).
    #[serde(rename = "SCAN_INIT_STATE")]
    InitState,
    /// Terminate the process.
    #[serde(rename = "EXIT")]
    Exit,
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel shared by every publisher in the process.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers; publishers that do
    /// not care call `.ok()`.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
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

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let scan_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Scan(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(10);
        let result = bus.emit(CoreEvent::Library(LibraryEvent::WorkRemoved { id: 1 }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Scan(_)));

        bus.emit(CoreEvent::Library(LibraryEvent::WorkAdded { id: 1 }))
            .unwrap();
        bus.emit(CoreEvent::Scan(ScanEvent::Tasks { tasks: vec![] }))
            .unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event, CoreEvent::Scan(ScanEvent::Tasks { tasks: vec![] }));
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_scan_event_wire_names() {
        let event = CoreEvent::Scan(ScanEvent::Results {
            results: vec![ResultEntry {
                code: "000123".to_string(),
                result: TaskResult::Added,
                count: 1,
            }],
        });

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "Scan",
                "payload": {
                    "event": "SCAN_RESULTS",
                    "results": [{ "code": "000123", "result": "added", "count": 1 }]
                }
            })
        );
    }

    #[test]
    fn test_control_message_parsing() {
        let init: ControlMessage =
            serde_json::from_value(json!({ "event": "SCAN_INIT_STATE" })).unwrap();
        let exit: ControlMessage = serde_json::from_value(json!({ "event": "EXIT" })).unwrap();
        assert_eq!(init, ControlMessage::InitState);
        assert_eq!(exit, ControlMessage::Exit);
    }

    #[test]
    fn test_counts_record_returns_running_total() {
        let mut counts = ScanCounts::default();
        assert_eq!(counts.record(TaskResult::Added), 1);
        assert_eq!(counts.record(TaskResult::Added), 2);
        assert_eq!(counts.record(TaskResult::Failed), 1);
        assert_eq!(counts.added, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 0);
    }

    #[test]
    fn test_severity() {
        let finished = CoreEvent::Scan(ScanEvent::Finished {
            message: "done".to_string(),
            counts: ScanCounts::default(),
        });
        assert_eq!(finished.severity(), EventSeverity::Info);
        let tasks = CoreEvent::Scan(ScanEvent::Tasks { tasks: vec![] });
        assert_eq!(tasks.severity(), EventSeverity::Debug);
    }
}
