//! Live session driver
//!
//! Runs one [`SyncSession`] on a single tokio task: loads the stored
//! snapshot, connects to the hub, then multiplexes incoming frames, editor
//! commands, the debounce deadline and the periodic fallback save.
//!
//! There is no automatic reconnect. When the connection closes or fails the
//! task keeps serving edits and saves until the editor exits.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::ClientMessage;
use super::session::{SessionEvent, SessionState, SyncSession, DEFAULT_DEBOUNCE};
use crate::config::Config;
use crate::identity::DocumentIdentity;
use crate::persistence::{PersistenceError, SnapshotStore};
use crate::replica::ReplicaEngine;
use crate::view::ViewSnapshot;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Timeout for opening the hub connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands sent to the session task
#[derive(Debug)]
pub enum SessionCommand {
    /// Raw edit event with the editor's current content
    Edit(String),
    /// Change the document title
    SetTitle(String),
    /// Save, then close; the save result is sent back. The session keeps
    /// running if the save failed.
    Exit(oneshot::Sender<Result<(), PersistenceError>>),
    /// Close without saving
    Shutdown,
}

/// Configuration for a live session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Hub WebSocket base URL
    pub hub_url: String,
    /// Quiet period before a local edit is materialized
    pub debounce: Duration,
    /// Interval between fallback saves
    pub save_interval: Duration,
    /// Fail if the initial sync takes longer than this
    pub handshake_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hub_url: "ws://localhost:8000".to_string(),
            debounce: DEFAULT_DEBOUNCE,
            save_interval: Duration::from_secs(5),
            handshake_timeout: None,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            hub_url: config.hub_url.clone(),
            debounce: config.debounce(),
            save_interval: config.save_interval(),
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// Handle to control and monitor a session task
pub struct SessionHandle {
    /// Send commands to the session task
    pub command_tx: mpsc::Sender<SessionCommand>,
    /// Receive events from the session task
    pub event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Watch session state
    pub state_rx: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Forward a raw edit event
    pub async fn edit(&self, content: String) -> Result<()> {
        self.command(SessionCommand::Edit(content)).await
    }

    pub async fn set_title(&self, title: String) -> Result<()> {
        self.command(SessionCommand::SetTitle(title)).await
    }

    /// Save and end the session
    ///
    /// Errors if the exit save failed, so the caller can hold navigation. The
    /// session is still running then and `exit` may be called again.
    pub async fn exit(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(SessionCommand::Exit(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| anyhow!("Session ended before saving"))?
            .context("Failed to save document")
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
    }

    async fn command(&self, command: SessionCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| anyhow!("Session is no longer running"))
    }
}

/// Spawn a live session task for one document
pub fn spawn_session<E, S>(
    config: SessionConfig,
    identity: DocumentIdentity,
    replica: E,
    store: S,
) -> SessionHandle
where
    E: ReplicaEngine + Send + 'static,
    S: SnapshotStore,
{
    let (command_tx, command_rx) = mpsc::channel(64);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionState::Connecting);

    let session = SyncSession::with_debounce(identity, replica, config.debounce);
    let task = SessionTask {
        config,
        session,
        store,
        event_tx,
        state_tx,
    };
    tokio::spawn(task.run(command_rx));

    SessionHandle {
        command_tx,
        event_rx,
        state_rx,
    }
}

struct SessionTask<E, S> {
    config: SessionConfig,
    session: SyncSession<E>,
    store: S,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl<E, S> SessionTask<E, S>
where
    E: ReplicaEngine + Send + 'static,
    S: SnapshotStore,
{
    async fn run(mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        let doc_id = self.session.identity().document_id().to_string();

        // Paint the stored copy first so a slow hub doesn't leave the view empty
        match self.store.load(&doc_id).await {
            Ok(snapshot) => self.session.paint_snapshot(snapshot),
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "Failed to load stored document");
                self.session.report_load_failure(e.to_string());
            }
        }
        self.publish_events();

        let connected = match self.session.identity().hub_url(&self.config.hub_url) {
            Ok(url) => connect(url.as_str()).await,
            Err(e) => Err(anyhow::Error::new(e).context("Invalid hub URL")),
        };
        let (mut sink, mut stream) = match connected {
            Ok(ws) => {
                self.session.connection_established();
                let (sink, stream) = ws.split();
                (Some(sink), Some(stream))
            }
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "Live sync unavailable");
                self.session.connection_failed();
                (None, None)
            }
        };
        self.publish_events();

        let period = self.config.save_interval;
        let mut save_tick = interval_at(Instant::now() + period, period);
        save_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let handshake_deadline = self.config.handshake_timeout.map(|t| Instant::now() + t);

        loop {
            let materialize_at = self.session.materialize_deadline();
            let handshake_at = handshake_deadline
                .filter(|_| self.session.state() == SessionState::AwaitingInitialSync);

            tokio::select! {
                frame = next_frame(&mut stream) => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.session.handle_frame(&text),
                        Some(Ok(Message::Close(_))) | None => {
                            info!(doc_id = %doc_id, "Hub closed the connection");
                            self.session.connection_closed();
                            stream = None;
                            sink = None;
                        }
                        Some(Ok(other)) => debug!("Ignoring non-text frame: {:?}", other),
                        Some(Err(e)) => {
                            warn!(doc_id = %doc_id, error = %e, "Hub connection error");
                            self.session.connection_failed();
                            stream = None;
                            sink = None;
                        }
                    }
                }

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Edit(content)) => {
                            self.session.local_edit(content, Instant::now());
                        }
                        Some(SessionCommand::SetTitle(title)) => self.session.set_title(title),
                        Some(SessionCommand::Exit(reply)) => {
                            self.session.flush_local_edit();
                            self.flush_outgoing(&mut sink).await;
                            let snapshot = self.session.view().snapshot();
                            let result = save(&self.store, &doc_id, &snapshot).await;
                            let saved = result.is_ok();
                            if let Err(ref e) = result {
                                self.session.report_save_failure(e.to_string());
                            }
                            let _ = reply.send(result);
                            // Stay up after a failed save so the exit can be retried
                            if saved {
                                break;
                            }
                        }
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }

                _ = sleep_until(materialize_at) => {
                    if let Err(e) = self.session.poll_materialize(Instant::now()) {
                        warn!(doc_id = %doc_id, error = %e, "Failed to materialize local edit");
                    }
                }

                _ = sleep_until(handshake_at) => self.session.handshake_timed_out(),

                _ = save_tick.tick() => {
                    let snapshot = self.session.view().snapshot();
                    if let Err(e) = save(&self.store, &doc_id, &snapshot).await {
                        self.session.report_save_failure(e.to_string());
                    }
                }
            }

            if self.session.state().is_terminal() {
                stream = None;
                sink = None;
            }
            if !self.flush_outgoing(&mut sink).await {
                stream = None;
            }
            self.publish_events();
        }

        if let Some(mut sink) = sink {
            sink.close().await.ok();
        }
        self.session.connection_closed();
        self.publish_events();
        info!(doc_id = %doc_id, stats = ?self.session.stats(), "Session ended");
    }

    /// Write queued messages; false if the transport failed
    async fn flush_outgoing(&mut self, sink: &mut Option<SplitSink<WsStream, Message>>) -> bool {
        let outgoing = self.session.take_outgoing();
        let Some(writer) = sink.as_mut() else {
            return true;
        };

        match write_all(writer, outgoing).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to send to hub");
                self.session.connection_failed();
                *sink = None;
                false
            }
        }
    }

    fn publish_events(&mut self) {
        for event in self.session.take_events() {
            if let SessionEvent::StateChanged(state) = event {
                let _ = self.state_tx.send(state);
            }
            let _ = self.event_tx.send(event);
        }
    }
}

async fn connect(url: &str) -> Result<WsStream> {
    debug!("Connecting to {}", url);
    let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| anyhow!("Timed out connecting to collaboration hub"))?
        .context("Failed to connect to collaboration hub")?;
    Ok(ws_stream)
}

async fn save<S: SnapshotStore>(
    store: &S,
    doc_id: &str,
    snapshot: &ViewSnapshot,
) -> Result<(), PersistenceError> {
    match store.save(doc_id, snapshot).await {
        Ok(()) => {
            debug!(doc_id = %doc_id, "Saved document");
            Ok(())
        }
        Err(e) => {
            warn!(doc_id = %doc_id, error = %e, "Failed to save document");
            Err(e)
        }
    }
}

async fn write_all<W>(writer: &mut W, messages: Vec<ClientMessage>) -> Result<(), WsError>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    for msg in messages {
        match msg.encode() {
            Ok(text) => writer.send(Message::Text(text)).await?,
            Err(e) => warn!(error = %e, "Failed to encode outgoing message"),
        }
    }
    Ok(())
}

async fn next_frame(
    stream: &mut Option<SplitStream<WsStream>>,
) -> Option<Result<Message, WsError>> {
    next_or_pending(stream).await
}

async fn next_or_pending<T, S>(stream: &mut Option<S>) -> Option<T>
where
    S: Stream<Item = T> + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
