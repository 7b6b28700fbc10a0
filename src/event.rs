// ABOUTME: The multi-subscriber event channel: server-pushed frames fan out to every registered listener
// ABOUTME: Built on tokio::sync::broadcast; a lagging subscriber drops old events rather than stalling the actor

use crate::frame::ResponseBody;
use tokio::sync::broadcast;

/// An event pushed by the server on stream-id `-1`.
#[derive(Clone, Debug)]
pub struct CqlEvent {
    pub event_type: String,
    pub payload: bytes::Bytes,
}

impl CqlEvent {
    pub(crate) fn from_body(body: ResponseBody) -> Option<Self> {
        match body {
            ResponseBody::Event {
                event_type,
                payload,
            } => Some(CqlEvent {
                event_type,
                payload,
            }),
            _ => None,
        }
    }
}

/// Capacity of the broadcast channel backing [`EventStream`]s.
///
/// Bounds lag per the backpressure policy recorded in DESIGN.md: a
/// subscriber that falls more than this many events behind observes a
/// `Lagged` error on its next `recv` and catches up from there, rather than
/// blocking dispatch of request/response traffic.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A handle delivering `Event` frames for the lifetime of the connection.
///
/// Returned by [`crate::Connection::register`]. Multiple `EventStream`s may
/// exist concurrently; each receives every event independently.
pub struct EventStream {
    receiver: broadcast::Receiver<CqlEvent>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<CqlEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event, or returns `None` once the connection has
    /// dropped every sender (the actor has stopped).
    pub async fn next(&mut self) -> Option<CqlEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged; events were dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
