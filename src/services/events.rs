//! Real-time event bus
//!
//! Background work (sync, plate solving) and handlers publish [`SkyEvent`]s on
//! a broadcast channel; every `GET /events` client gets its own receiver and
//! sees the events as Server-Sent Events.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::models::{Image, PlateSolvingJob};
use crate::services::sync::SyncReport;

/// Events buffered per subscriber before slow clients start missing some
const EVENT_CAPACITY: usize = 256;

/// Something clients may want to refresh their view for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkyEvent {
    SyncStarted,
    SyncCompleted { report: SyncReport },
    SyncFailed { error: String },
    JobUpdated { job: PlateSolvingJob },
    ImageUpdated { image: Image },
}

impl SkyEvent {
    /// Name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            SkyEvent::SyncStarted => "sync_started",
            SkyEvent::SyncCompleted { .. } => "sync_completed",
            SkyEvent::SyncFailed { .. } => "sync_failed",
            SkyEvent::JobUpdated { .. } => "job_updated",
            SkyEvent::ImageUpdated { .. } => "image_updated",
        }
    }
}

/// Broadcast channel shared by publishers and SSE clients
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SkyEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to every subscriber
    ///
    /// Having no subscribers is normal and not an error.
    pub fn publish(&self, event: SkyEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(count) => debug!(event_type, subscribers = count, "Published event"),
            Err(_) => debug!(event_type, "Published event with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SkyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Streams events as SSE frames, skipping over anything a lagging client missed
    pub fn sse_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> + use<> {
        BroadcastStream::new(self.subscribe()).filter_map(|result| async move {
            match result {
                Ok(event) => match Event::default().event(event.event_type()).json_data(&event) {
                    Ok(frame) => Some(Ok(frame)),
                    Err(e) => {
                        warn!("Failed to serialize event: {}", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("SSE client lagged: {:?}", e);
                    None
                }
            }
        })
    }

    /// Builds the SSE response for a newly connected client
    pub fn sse_response(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
        Sse::new(self.sse_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}
