// ABOUTME: A request still awaiting its reply, plus the handle used to deliver that reply
// ABOUTME: Replier is the core's routing handle: either a one-shot caller or a streaming channel

use crate::connection::QueryOutcome;
use crate::error::ConnResult;
use crate::frame::Request;
use crate::paging::RowSender;
use tokio::sync::oneshot;

/// How to deliver the eventual reply for one outstanding request.
///
/// A request starts life as `Single`. The first page of a paged result
/// switches it to `Stream` for every subsequent follow-up page.
pub(crate) enum Replier {
    Single(oneshot::Sender<ConnResult<QueryOutcome>>),
    Stream(RowSender),
}

/// An in-flight or waiting request: the original value (so it can be
/// re-issued as a paging follow-up, or re-dispatched after a reconnect) plus
/// its `Replier`.
pub(crate) struct PendingRequest {
    pub request: Request,
    pub replier: Replier,
}

impl PendingRequest {
    pub fn new(request: Request, replier: Replier) -> Self {
        Self { request, replier }
    }

    /// Delivers `result` and consumes the pending entry. If the `Replier` is
    /// a streaming one and a plain reply was needed instead, the caller's
    /// oneshot has already been used up by an earlier page; this is a
    /// protocol-shape mismatch and is logged rather than silently ignored.
    pub fn reply(self, result: ConnResult<QueryOutcome>) {
        match self.replier {
            Replier::Single(tx) => {
                let _ = tx.send(result);
            }
            Replier::Stream(_) => {
                tracing::error!("dropped a terminal reply for a request already in stream mode");
            }
        }
    }
}
