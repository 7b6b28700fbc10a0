// ABOUTME: The connection actor: the single task owning the TCP socket, stream table, and waiting queue
// ABOUTME: All state mutation happens here; callers only ever interact with it by message (see super::Connection)

use crate::codec::Codec;
use crate::config::ConnectionConfig;
use crate::connection::backoff::Backoff;
use crate::connection::pending::{PendingRequest, Replier};
use crate::connection::stream_table::StreamTable;
use crate::connection::{Command, QueryOutcome};
use crate::error::ConnError;
use crate::event::{CqlEvent, EventStream, EVENT_CHANNEL_CAPACITY};
use crate::frame::{
    Frame, Request, ResponseBody, EVENT_STREAM, FIRE_AND_FORGET_STREAM, USE_KEYSPACE_STREAM,
};
use crate::paging::RowStream;
use crate::value::{QueryParams, Rows};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};

/// Outcome of one connect-and-handshake attempt.
enum Handshake {
    Ready(TcpStream),
    /// Startup was rejected, or an unexpected frame answered it: not transient.
    Fatal(ConnError),
    /// A transport-level failure: worth retrying after backoff.
    Transient(ConnError),
}

enum ServeOutcome {
    Disconnected,
    Stopped,
}

pub(crate) struct ConnectionActor {
    config: ConnectionConfig,
    commands: mpsc::Receiver<Command>,
    socket: Option<TcpStream>,
    buffer: BytesMut,
    stream_table: StreamTable,
    waiting: VecDeque<PendingRequest>,
    backoff: Backoff,
    events: broadcast::Sender<CqlEvent>,
}

impl ConnectionActor {
    pub fn new(config: ConnectionConfig, commands: mpsc::Receiver<Command>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            commands,
            socket: None,
            buffer: BytesMut::with_capacity(4 * 1024),
            stream_table: StreamTable::new(),
            waiting: VecDeque::new(),
            backoff: Backoff::new(),
            events,
        }
    }

    #[tracing::instrument(skip(self), fields(host = %self.config.hostname, port = self.config.port))]
    pub async fn run(mut self) {
        loop {
            match self.connect_and_handshake().await {
                Handshake::Ready(socket) => {
                    tracing::info!("connected and handshake complete");
                    self.socket = Some(socket);
                    self.backoff.reset();
                    if let Some(keyspace) = self.config.keyspace.clone() {
                        self.send_fire_and_forget_use(&keyspace).await;
                    }
                    self.drain_waiting().await;
                    match self.serve().await {
                        ServeOutcome::Disconnected => continue,
                        ServeOutcome::Stopped => return,
                    }
                }
                Handshake::Fatal(err) => {
                    tracing::error!(error = %err, "handshake failed fatally; stopping");
                    self.fail_everyone();
                    return;
                }
                Handshake::Transient(err) => {
                    tracing::warn!(error = %err, "connect attempt failed; backing off");
                    if self.sleep_or_stop().await {
                        return;
                    }
                }
            }
        }
    }

    async fn connect_and_handshake(&mut self) -> Handshake {
        self.buffer.clear();
        let (host, port) = self.config.addr();
        let mut socket = match TcpStream::connect((host.as_str(), port)).await {
            Ok(socket) => socket,
            Err(e) => return Handshake::Transient(ConnError::Io(e)),
        };

        let startup = Codec::encode(&Request::Startup, FIRE_AND_FORGET_STREAM);
        if let Err(e) = socket.write_all(&startup).await {
            return Handshake::Transient(ConnError::Io(e));
        }

        let read = tokio::time::timeout(self.config.timeout, self.read_frame_from(&mut socket)).await;
        match read {
            Ok(Ok(Some(frame))) => match frame.body {
                ResponseBody::Ready => Handshake::Ready(socket),
                ResponseBody::Error { code, message } => {
                    Handshake::Fatal(ConnError::Server { code, message })
                }
                other => Handshake::Fatal(ConnError::UnexpectedFrame {
                    expected: "Ready",
                    actual: format!("{other:?}"),
                }),
            },
            Ok(Ok(None)) => Handshake::Transient(ConnError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            ))),
            Ok(Err(e)) => Handshake::Transient(e),
            Err(_) => Handshake::Transient(ConnError::Timeout),
        }
    }

    /// Reads directly off `socket` (not yet `self.socket`) into `self.buffer`
    /// until a complete frame is available. Used only for the synchronous
    /// handshake read.
    async fn read_frame_from(&mut self, socket: &mut TcpStream) -> Result<Option<Frame>, ConnError> {
        loop {
            match Codec::decode(&mut self.buffer) {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(e) => return Err(ConnError::Decode(e.to_string())),
            }
            if socket.read_buf(&mut self.buffer).await? == 0 {
                return Ok(None);
            }
        }
    }

    async fn send_fire_and_forget_use(&mut self, keyspace: &str) {
        let cql = format!("USE {keyspace}");
        let request = Request::Query {
            cql,
            params: QueryParams::default(),
        };
        let bytes = Codec::encode(&request, USE_KEYSPACE_STREAM);
        let Some(socket) = self.socket.as_mut() else {
            return;
        };
        if let Err(e) = socket.write_all(&bytes).await {
            tracing::warn!(error = %e, "failed to send implicit USE; will retry on next connect");
            self.teardown_socket();
        }
    }

    async fn drain_waiting(&mut self) {
        let queued: Vec<PendingRequest> = self.waiting.drain(..).collect();
        for pending in queued {
            if self.socket.is_none() {
                // A write failure while draining already tore the socket down again.
                self.waiting.push_back(pending);
                continue;
            }
            self.submit(pending.request, pending.replier).await;
        }
    }

    async fn serve(&mut self) -> ServeOutcome {
        let mut read_buf = [0u8; 4096];
        loop {
            loop {
                match Codec::decode(&mut self.buffer) {
                    Ok(Some(frame)) => self.dispatch(frame).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "malformed frame; disconnecting");
                        self.teardown_socket();
                        return ServeOutcome::Disconnected;
                    }
                }
            }

            // Dispatching a frame above can submit a paging follow-up, whose
            // write failure tears the socket down; the select below needs one.
            if self.socket.is_none() {
                return ServeOutcome::Disconnected;
            }

            tokio::select! {
                maybe_cmd = self.commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Stop { reply }) => {
                            self.fail_everyone();
                            self.teardown_socket();
                            let _ = reply.send(());
                            return ServeOutcome::Stopped;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            self.teardown_socket();
                            return ServeOutcome::Stopped;
                        }
                    }
                }
                result = self.socket.as_mut().expect("serve requires a socket").read(&mut read_buf) => {
                    match result {
                        Ok(0) => {
                            tracing::warn!("server closed the connection");
                            self.teardown_socket();
                            return ServeOutcome::Disconnected;
                        }
                        Ok(n) => self.buffer.extend_from_slice(&read_buf[..n]),
                        Err(e) => {
                            tracing::warn!(error = %e, "transport read error");
                            self.teardown_socket();
                            return ServeOutcome::Disconnected;
                        }
                    }
                }
            }

            if self.socket.is_none() {
                return ServeOutcome::Disconnected;
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { request, reply } => {
                self.submit(request, Replier::Single(reply)).await;
            }
            Command::UseKeyspace { keyspace, reply } => {
                self.config.keyspace = Some(keyspace.clone());
                self.send_fire_and_forget_use(&keyspace).await;
                let _ = reply.send(());
            }
            Command::Stop { .. } => unreachable!("Stop is handled directly in the serve loop"),
        }
    }

    /// Queue while disconnected, otherwise allocate a stream-id, encode,
    /// write, and record the mapping.
    async fn submit(&mut self, request: Request, replier: Replier) {
        if self.socket.is_none() {
            self.waiting.push_back(PendingRequest::new(request, replier));
            return;
        }

        let id = match self.stream_table.try_reserve() {
            Some(id) => id,
            None => {
                PendingRequest::new(request, replier).reply(Err(ConnError::Busy));
                return;
            }
        };

        let bytes = Codec::encode(&request, id);
        let socket = self.socket.as_mut().expect("checked above");
        if let Err(e) = socket.write_all(&bytes).await {
            tracing::warn!(error = %e, "write failed; moving request to waiting queue");
            self.waiting.push_back(PendingRequest::new(request, replier));
            self.teardown_socket();
            return;
        }

        self.stream_table.insert(id, PendingRequest::new(request, replier));
    }

    async fn dispatch(&mut self, frame: Frame) {
        match frame.stream {
            EVENT_STREAM => match CqlEvent::from_body(frame.body) {
                Some(event) => {
                    let _ = self.events.send(event);
                }
                None => tracing::warn!("non-Event frame arrived on the event stream-id"),
            },
            FIRE_AND_FORGET_STREAM => {
                tracing::trace!("ignoring frame on the fire-and-forget stream-id");
            }
            USE_KEYSPACE_STREAM => match frame.body {
                ResponseBody::Error { code, message } => {
                    tracing::error!(code, %message, "implicit USE <keyspace> failed");
                }
                other => tracing::info!(?other, "implicit USE <keyspace> acknowledged"),
            },
            id => match self.stream_table.remove(id) {
                Some(pending) => self.route_reply(pending, frame.body).await,
                None => tracing::warn!(stream_id = id, "reply for unknown stream-id; dropping"),
            },
        }
    }

    async fn route_reply(&mut self, pending: PendingRequest, body: ResponseBody) {
        match body {
            ResponseBody::Rows(rows) if rows.metadata.paging_state.is_some() => {
                self.handle_page(pending, rows).await;
            }
            ResponseBody::Rows(rows) => {
                self.handle_terminal_rows(pending, rows).await;
            }
            ResponseBody::Void => pending.reply(Ok(QueryOutcome::Void)),
            ResponseBody::Supported(options) => {
                pending.reply(Ok(QueryOutcome::Supported(options)));
            }
            ResponseBody::Prepared(prepared) => {
                pending.reply(Ok(QueryOutcome::Prepared(prepared)));
            }
            ResponseBody::Ready => {
                let stream = EventStream::new(self.events.subscribe());
                pending.reply(Ok(QueryOutcome::Registered(stream)));
            }
            ResponseBody::Error { code, message } => {
                pending.reply(Err(ConnError::Server { code, message }));
            }
            ResponseBody::SetKeyspace(_) | ResponseBody::Unknown { .. } => {
                pending.reply(Ok(QueryOutcome::Void));
            }
            ResponseBody::Event { .. } => {
                tracing::error!("an Event frame was routed to a caller instead of the event channel");
            }
        }
    }

    /// First (or subsequent) page of a paged result.
    async fn handle_page(&mut self, pending: PendingRequest, rows: Rows) {
        let PendingRequest { request, replier } = pending;
        let paging_state = rows
            .metadata
            .paging_state
            .clone()
            .expect("caller checked paging_state is Some");

        let row_sender = match replier {
            Replier::Single(reply_tx) => {
                let (tx, stream) = RowStream::channel();
                let _ = reply_tx.send(Ok(QueryOutcome::Stream(stream)));
                tx
            }
            Replier::Stream(tx) => tx,
        };

        for row in rows.data {
            if row_sender.send(row).await.is_err() {
                tracing::warn!("row consumer dropped mid-stream; abandoning remaining pages");
                return;
            }
        }

        let follow_up = with_paging_state(&request, paging_state);
        self.submit(follow_up, Replier::Stream(row_sender)).await;
    }

    /// Final page of a paged result, or the only page of a non-paged one.
    async fn handle_terminal_rows(&mut self, pending: PendingRequest, rows: Rows) {
        match pending.replier {
            Replier::Single(reply_tx) => {
                let _ = reply_tx.send(Ok(QueryOutcome::Rows(rows.data)));
            }
            Replier::Stream(row_sender) => {
                for row in rows.data {
                    if row_sender.send(row).await.is_err() {
                        tracing::warn!("row consumer dropped before stream end");
                        return;
                    }
                }
                // `row_sender` drops here, closing the channel: end-of-stream.
            }
        }
    }

    /// Close the socket, move every in-flight request back onto the waiting
    /// queue, reset the stream table and buffer.
    fn teardown_socket(&mut self) {
        self.socket = None;
        self.buffer.clear();
        for pending in self.stream_table.drain() {
            self.waiting.push_back(pending);
        }
    }

    /// Fails every request already recorded (in-flight or waiting) plus any
    /// already sitting in the command channel's buffer. A caller can race a
    /// `Submit` in just before a fatal handshake resolves, and it should see
    /// `Stopped` too rather than `ActorGone`.
    fn fail_everyone(&mut self) {
        for pending in self.stream_table.drain() {
            pending.reply(Err(ConnError::Stopped));
        }
        for pending in self.waiting.drain(..) {
            pending.reply(Err(ConnError::Stopped));
        }
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                Command::Submit { reply, .. } => {
                    let _ = reply.send(Err(ConnError::Stopped));
                }
                Command::UseKeyspace { reply, .. } => {
                    let _ = reply.send(());
                }
                Command::Stop { reply } => {
                    let _ = reply.send(());
                }
            }
        }
    }

    /// Sleeps out the current backoff delay, but keeps draining the command
    /// channel into the waiting queue (and honoring an early `stop()`)
    /// while it does.
    async fn sleep_or_stop(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                maybe_cmd = self.commands.recv() => {
                    match maybe_cmd {
                        Some(Command::Stop { reply }) => {
                            self.fail_everyone();
                            let _ = reply.send(());
                            return true;
                        }
                        Some(Command::Submit { request, reply }) => {
                            self.waiting.push_back(PendingRequest::new(request, Replier::Single(reply)));
                        }
                        Some(Command::UseKeyspace { keyspace, reply }) => {
                            self.config.keyspace = Some(keyspace);
                            let _ = reply.send(());
                        }
                        None => return true,
                    }
                }
            }
        }
    }
}

fn with_paging_state(request: &Request, paging_state: Bytes) -> Request {
    match request {
        Request::Query { cql, params } => Request::Query {
            cql: cql.clone(),
            params: params.with_paging_state(paging_state),
        },
        Request::Execute { id, params } => Request::Execute {
            id: id.clone(),
            params: params.with_paging_state(paging_state),
        },
        other => other.clone(),
    }
}
