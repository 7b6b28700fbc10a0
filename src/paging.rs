// ABOUTME: Delivery channel for a paged query result: a single-producer queue the actor pushes rows onto
// ABOUTME: Dropped/closed by the actor when the terminal page (no paging_state) has been delivered

use crate::value::Row;
use tokio::sync::mpsc;

/// Bound on how many undelivered rows the actor will buffer for a single
/// paged query before the producer side of [`mpsc::channel`] applies
/// backpressure. This only slows issuing the *next page* for this query; it
/// does not affect other in-flight requests, which use distinct stream-ids.
pub const ROW_CHANNEL_CAPACITY: usize = 1024;

/// Producer half, owned by the connection actor.
pub(crate) type RowSender = mpsc::Sender<Row>;

/// Consumer half, returned to the caller as the `Stream` result of a paged query.
pub struct RowStream {
    receiver: mpsc::Receiver<Row>,
}

impl RowStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Row>) -> Self {
        Self { receiver }
    }

    pub(crate) fn channel() -> (RowSender, Self) {
        let (tx, rx) = mpsc::channel(ROW_CHANNEL_CAPACITY);
        (tx, Self::new(rx))
    }

    /// Returns the next row in server order, or `None` once the result set
    /// is exhausted (the terminal page has been delivered).
    pub async fn next(&mut self) -> Option<Row> {
        self.receiver.recv().await
    }
}
