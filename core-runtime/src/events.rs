//! # Event Bus System
//!
//! Typed, best-effort notifications from the core using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per component (`AuthEvent`, `StreamEvent`,
//!   `CacheEvent`) wrapped in [`CoreEvent`]
//! - **EventBus**: cloneable broadcast sender shared by every component
//! - **EventStream**: receiver wrapper with an optional filter predicate
//!
//! ```text
//! ┌────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ TokenAuthority ├────────>│           ├────────────>│ Subscriber │
//! └────────────────┘         │ EventBus  │             └────────────┘
//! ┌────────────────┐  emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Stream / Media ├────────>│  channel) ├────────────>│ Subscriber │
//! └────────────────┘         └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! let bus = EventBus::new(100);
//! let _ = bus.emit(CoreEvent::Cache(CacheEvent::TrackEvicted {
//!     track_id: "42".to_string(),
//! }));
//! ```
//!
//! Emitting without subscribers returns an error that publishers ignore:
//! events are notifications, never part of an operation's result.
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may continue.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Token Authority lifecycle
    Auth(AuthEvent),
    /// Stream Resolution Cache
    Stream(StreamEvent),
    /// Local Media Cache
    Cache(CacheEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Stream(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Stream(StreamEvent::ResolutionFailed { .. })
            | CoreEvent::Cache(CacheEvent::DownloadFailed { .. })
            | CoreEvent::Cache(CacheEvent::IndexRecovered { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut { .. })
            | CoreEvent::Cache(CacheEvent::ReconcileCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity, used by hosts to decide what to surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authentication Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// An initial grant started
    SigningIn { provider: String, grant: String },
    /// An initial grant completed and the token was stored
    SignedIn { provider: String, grant: String },
    TokenRefreshing { provider: String },
    TokenRefreshed {
        provider: String,
        /// Unix seconds
        expires_at: i64,
    },
    /// The access token was dropped after an upstream 401
    TokenInvalidated { provider: String },
    SignedOut { provider: String },
    AuthError {
        provider: String,
        message: String,
        /// Whether retrying later can succeed without user action
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SigningIn { .. } => "Authentication in progress",
            AuthEvent::SignedIn { .. } => "Signed in successfully",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::TokenInvalidated { .. } => "Access token invalidated",
            AuthEvent::SignedOut { .. } => "Signed out",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

// ============================================================================
// Stream Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StreamEvent {
    Resolved {
        track_id: String,
        /// Unix seconds
        expires_at: i64,
    },
    ResolutionFailed { track_id: String, message: String },
    PreloadCompleted {
        requested: usize,
        resolved: usize,
        failed: usize,
    },
}

impl StreamEvent {
    fn description(&self) -> &str {
        match self {
            StreamEvent::Resolved { .. } => "Stream resolved",
            StreamEvent::ResolutionFailed { .. } => "Stream resolution failed",
            StreamEvent::PreloadCompleted { .. } => "Stream preload completed",
        }
    }
}

// ============================================================================
// Media Cache Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    ReconcileStarted { desired: usize },
    TrackCached { track_id: String, version: i64 },
    TrackEvicted { track_id: String },
    DownloadFailed { track_id: String, message: String },
    ReconcileCompleted {
        pruned: usize,
        downloaded: usize,
        failed: usize,
        up_to_date: usize,
    },
    /// The sidecar index was unreadable and has been reset
    IndexRecovered { reason: String },
    Cleared { removed: usize },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::ReconcileStarted { .. } => "Media cache reconcile started",
            CacheEvent::TrackCached { .. } => "Track cached",
            CacheEvent::TrackEvicted { .. } => "Track evicted",
            CacheEvent::DownloadFailed { .. } => "Track download failed",
            CacheEvent::ReconcileCompleted { .. } => "Media cache reconcile completed",
            CacheEvent::IndexRecovered { .. } => "Media cache index recovered",
            CacheEvent::Cleared { .. } => "Media cache cleared",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning the number of receivers reached
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with an [`EventStream`] wrapper
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

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

/// Receiver that skips events rejected by its filter
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

    /// Non-blocking receive; `None` when nothing matching is queued
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn evicted(id: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::TrackEvicted {
            track_id: id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.stream();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(evicted("a")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Auth(AuthEvent::SignedIn {
            provider: "soundcloud".to_string(),
            grant: "client_credentials".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| matches!(event, CoreEvent::Stream(_)));

        bus.emit(evicted("a")).ok();
        let resolved = CoreEvent::Stream(StreamEvent::Resolved {
            track_id: "T1".to_string(),
            expires_at: 1_700_000_000,
        });
        bus.emit(resolved.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), resolved);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = bus
            .stream()
            .filter(|event| event.severity() >= EventSeverity::Warning);

        bus.emit(evicted("a")).ok();
        let failed = CoreEvent::Cache(CacheEvent::DownloadFailed {
            track_id: "b".to_string(),
            message: "timeout".to_string(),
        });
        bus.emit(failed.clone()).ok();

        assert_eq!(stream.try_recv().unwrap().unwrap(), failed);
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(evicted(&i.to_string())).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity_and_description() {
        let error = CoreEvent::Auth(AuthEvent::AuthError {
            provider: "soundcloud".to_string(),
            message: "invalid_client".to_string(),
            recoverable: false,
        });
        assert_eq!(error.severity(), EventSeverity::Error);
        assert_eq!(error.description(), "Authentication error");

        let recovered = CoreEvent::Cache(CacheEvent::IndexRecovered {
            reason: "bad json".to_string(),
        });
        assert_eq!(recovered.severity(), EventSeverity::Warning);
        assert_eq!(evicted("a").severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Cache(CacheEvent::ReconcileCompleted {
            pruned: 1,
            downloaded: 2,
            failed: 0,
            up_to_date: 3,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Cache");
        assert_eq!(json["payload"]["event"], "ReconcileCompleted");
        assert_eq!(json["payload"]["downloaded"], 2);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
