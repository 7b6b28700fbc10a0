// ABOUTME: Public handle to a single-node CQL connection, backed by a background actor task
// ABOUTME: Every method sends a command and awaits a reply with the caller-supplied timeout

pub(crate) mod actor;
mod backoff;
pub(crate) mod pending;
mod stream_table;

use crate::config::ConnectionConfig;
use crate::error::{ConnError, ConnResult};
use crate::event::EventStream;
use crate::frame::Request;
use crate::paging::RowStream;
use crate::value::{Prepared, QueryParams, Row};
use actor::ConnectionActor;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// The result of a call that can answer with more than one shape of frame.
/// `Connection`'s typed methods unwrap this into the shape each one promises;
/// seeing the wrong variant here is a protocol-level bug, not a user error.
pub enum QueryOutcome {
    Void,
    Rows(Vec<Row>),
    Stream(RowStream),
    Supported(HashMap<String, Vec<String>>),
    Prepared(Prepared),
    Registered(EventStream),
}

impl std::fmt::Debug for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryOutcome::Void => "Void",
            QueryOutcome::Rows(_) => "Rows",
            QueryOutcome::Stream(_) => "Stream",
            QueryOutcome::Supported(_) => "Supported",
            QueryOutcome::Prepared(_) => "Prepared",
            QueryOutcome::Registered(_) => "Registered",
        };
        f.write_str(name)
    }
}

pub(crate) enum Command {
    Submit {
        request: Request,
        reply: oneshot::Sender<ConnResult<QueryOutcome>>,
    },
    UseKeyspace {
        keyspace: String,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// A handle to a single, auto-reconnecting CQL connection.
///
/// Cloning shares the same background actor and TCP socket; cheap to pass
/// around. Dropping every clone lets the actor exit on its own once the
/// command channel closes.
#[derive(Clone)]
pub struct Connection {
    commands: mpsc::Sender<Command>,
}

impl Connection {
    /// Spawns the actor and returns immediately. The actor begins
    /// connecting in the background: a connection is created disconnected
    /// and starts dialing as soon as it is scheduled.
    pub fn connect(config: ConnectionConfig) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(ConnectionActor::new(config, rx).run());
        Self { commands: tx }
    }

    async fn call(&self, request: Request, timeout: Duration) -> ConnResult<QueryOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Submit {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnError::ActorGone)?;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnError::ActorGone),
            Err(_) => Err(ConnError::Timeout),
        }
    }

    /// `OPTIONS`: the set of options the server supports.
    #[tracing::instrument(skip(self))]
    pub async fn options(&self, timeout: Duration) -> ConnResult<HashMap<String, Vec<String>>> {
        match self.call(Request::Options, timeout).await? {
            QueryOutcome::Supported(options) => Ok(options),
            other => Err(unexpected("Supported", other)),
        }
    }

    /// Switches the connection's default keyspace. Sent as an implicit
    /// `USE <keyspace>` on the reserved stream-id whenever the connection
    /// (re)connects, so the keyspace follows every reconnect automatically.
    #[tracing::instrument(skip(self))]
    pub async fn use_keyspace(&self, keyspace: impl Into<String>) -> ConnResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::UseKeyspace {
                keyspace: keyspace.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| ConnError::ActorGone)?;
        reply_rx.await.map_err(|_| ConnError::ActorGone)
    }

    /// `QUERY`: runs `cql` with the given parameters. A result with a
    /// non-empty paging state comes back as `QueryOutcome::Stream`; a
    /// self-contained result comes back as `QueryOutcome::Rows` or `Void`.
    #[tracing::instrument(skip(self, params))]
    pub async fn query(
        &self,
        cql: impl Into<String>,
        params: QueryParams,
        timeout: Duration,
    ) -> ConnResult<QueryOutcome> {
        let request = Request::Query {
            cql: cql.into(),
            params,
        };
        match self.call(request, timeout).await? {
            outcome @ (QueryOutcome::Void | QueryOutcome::Rows(_) | QueryOutcome::Stream(_)) => {
                Ok(outcome)
            }
            other => Err(unexpected("Void, Rows, or Stream", other)),
        }
    }

    /// `PREPARE`: compiles `cql` server-side and returns its id.
    #[tracing::instrument(skip(self))]
    pub async fn prepare(&self, cql: impl Into<String>, timeout: Duration) -> ConnResult<Prepared> {
        let request = Request::Prepare { cql: cql.into() };
        match self.call(request, timeout).await? {
            QueryOutcome::Prepared(prepared) => Ok(prepared),
            other => Err(unexpected("Prepared", other)),
        }
    }

    /// `EXECUTE`: runs a previously prepared statement.
    #[tracing::instrument(skip(self, prepared, params))]
    pub async fn execute(
        &self,
        prepared: &Prepared,
        params: QueryParams,
        timeout: Duration,
    ) -> ConnResult<QueryOutcome> {
        let request = Request::Execute {
            id: prepared.id.clone(),
            params,
        };
        match self.call(request, timeout).await? {
            outcome @ (QueryOutcome::Void | QueryOutcome::Rows(_) | QueryOutcome::Stream(_)) => {
                Ok(outcome)
            }
            other => Err(unexpected("Void, Rows, or Stream", other)),
        }
    }

    /// `REGISTER`: subscribes to server push events. The server acknowledges
    /// with `Ready`, at which point the caller gets an `EventStream` fed
    /// from the connection's broadcast channel.
    #[tracing::instrument(skip(self))]
    pub async fn register(
        &self,
        event_types: Vec<String>,
        timeout: Duration,
    ) -> ConnResult<EventStream> {
        let request = Request::Register { event_types };
        match self.call(request, timeout).await? {
            QueryOutcome::Registered(stream) => Ok(stream),
            other => Err(unexpected("Registered", other)),
        }
    }

    /// Shuts the connection down: closes the socket, fails every in-flight
    /// and waiting request with `ConnError::Stopped`, and stops the actor.
    pub async fn stop(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Stop { reply: reply_tx })
            .await
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}

fn unexpected(expected: &'static str, actual: QueryOutcome) -> ConnError {
    ConnError::UnexpectedFrame {
        expected,
        actual: format!("{actual:?}"),
    }
}
