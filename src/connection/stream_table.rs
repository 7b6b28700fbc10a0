// ABOUTME: Maps in-flight protocol stream-ids to their pending caller, and owns stream-id allocation
// ABOUTME: User ids live in [2, 32767]; 0 is fire-and-forget and 1 is reserved for the implicit USE

use crate::connection::pending::PendingRequest;
use crate::frame::{StreamId, FIRST_USER_STREAM, LAST_USER_STREAM};
use std::collections::HashMap;

/// The stream table, plus the monotonic cursor used to hand out fresh ids.
///
/// `last_stream_id` is never `-1`, `0`, or `1` (data model invariant): it is
/// reset to `1` on construction and after every disconnect so the first
/// allocation after a (re)connect is `2`.
pub(crate) struct StreamTable {
    table: HashMap<StreamId, PendingRequest>,
    last_stream_id: StreamId,
}

impl StreamTable {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            last_stream_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    fn next_candidate(&mut self) -> StreamId {
        let next = if self.last_stream_id >= LAST_USER_STREAM {
            FIRST_USER_STREAM
        } else {
            self.last_stream_id + 1
        };
        self.last_stream_id = next;
        next
    }

    /// Allocates the next stream-id in the wrap sequence. Returns `None` if
    /// the candidate id collides with one still awaiting reply: the
    /// stream-id space is exhausted, treated as busy rather than a reason to
    /// keep scanning for a free id.
    pub fn try_reserve(&mut self) -> Option<StreamId> {
        let id = self.next_candidate();
        if self.table.contains_key(&id) {
            None
        } else {
            Some(id)
        }
    }

    pub fn insert(&mut self, id: StreamId, pending: PendingRequest) {
        self.table.insert(id, pending);
    }

    pub fn remove(&mut self, id: StreamId) -> Option<PendingRequest> {
        self.table.remove(&id)
    }

    /// Empties the table (on disconnect) and resets the id cursor, returning
    /// every entry so the caller can move them onto the waiting queue.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let items = self.table.drain().map(|(_, pending)| pending).collect();
        self.last_stream_id = 1;
        items
    }
}
