//! Sync session state machine
//!
//! [`SyncSession`] holds everything one open document needs: the replica,
//! the echo-suppression flag, the view mirror and the debounce timer. It does
//! no I/O. The connection driver feeds it transport events and frames, then
//! drains [`SyncSession::take_outgoing`] and [`SyncSession::take_events`].
//!
//! ```text
//! Connecting ──established──▶ AwaitingInitialSync ──sync──▶ Active
//!     │                              │                        │
//!     └──────── close / error ───────┴────────────────────────┴──▶ Closed | Failed
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ServerMessage};
use super::pipeline::Debouncer;
use crate::codec::{encode_summary, CodecError};
use crate::identity::DocumentIdentity;
use crate::replica::{ReplicaEngine, ReplicaError};
use crate::view::{ViewSnapshot, ViewState};

/// Updates held back while waiting for the first snapshot
const MAX_PENDING_UPDATES: usize = 256;

/// Default quiet period before a local edit is materialized
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Errors inside one session step
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Malformed delta: {0}")]
    Codec(#[from] CodecError),

    #[error("Replica error: {0}")]
    Replica(#[from] ReplicaError),
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not yet open
    Connecting,
    /// Connected, waiting for the hub's snapshot
    AwaitingInitialSync,
    /// Snapshot applied, live editing
    Active,
    /// Connection closed
    Closed,
    /// Connection failed
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingInitialSync => "awaiting_initial_sync",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events for the editor UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// The view content must be replaced
    Repaint(String),
    TitleChanged(String),
    /// Problem reported by the hub
    ServerError(String),
    Info(String),
    LoadFailed(String),
    SaveFailed(String),
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub sent_updates: u64,
    pub sync_requests: u64,
    pub applied_deltas: u64,
    pub suppressed_echoes: u64,
    pub discarded_messages: u64,
}

/// One open editing session for one document
pub struct SyncSession<E> {
    pub(super) identity: DocumentIdentity,
    pub(super) replica: E,
    pub(super) state: SessionState,
    /// True only while a remote delta is being applied
    pub(super) applying_remote: bool,
    pub(super) sync_requested: bool,
    /// A local edit was held back because the session was not active
    pub(super) deferred_edit: bool,
    pub(super) pending_updates: VecDeque<String>,
    pub(super) debouncer: Debouncer,
    pub(super) view: ViewState,
    pub(super) outgoing: VecDeque<ClientMessage>,
    pub(super) events: VecDeque<SessionEvent>,
    pub(super) stats: SessionStats,
}

impl<E: ReplicaEngine> SyncSession<E> {
    /// Create a session with the default debounce window
    pub fn new(identity: DocumentIdentity, replica: E) -> Self {
        Self::with_debounce(identity, replica, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(identity: DocumentIdentity, replica: E, debounce: Duration) -> Self {
        Self {
            identity,
            replica,
            state: SessionState::Connecting,
            applying_remote: false,
            sync_requested: false,
            deferred_edit: false,
            pending_updates: VecDeque::new(),
            debouncer: Debouncer::new(debounce),
            view: ViewState::new(),
            outgoing: VecDeque::new(),
            events: VecDeque::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn identity(&self) -> &DocumentIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn replica(&self) -> &E {
        &self.replica
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Messages to write to the transport, in order
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        self.outgoing.drain(..).collect()
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    // ==================== Transport events ====================

    pub fn connection_established(&mut self) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "Connection established in unexpected state");
            return;
        }
        info!(doc_id = %self.identity.document_id(), "Connected, awaiting initial sync");
        self.set_state(SessionState::AwaitingInitialSync);
    }

    pub fn connection_closed(&mut self) {
        self.terminate(SessionState::Closed);
    }

    pub fn connection_failed(&mut self) {
        self.terminate(SessionState::Failed);
    }

    /// Handshake deadline passed
    ///
    /// Only meaningful when the driver runs with a handshake timeout.
    pub fn handshake_timed_out(&mut self) {
        if self.state == SessionState::AwaitingInitialSync {
            warn!(doc_id = %self.identity.document_id(), "Timed out waiting for initial sync");
            self.terminate(SessionState::Failed);
        }
    }

    fn terminate(&mut self, state: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        self.debouncer.cancel();
        self.pending_updates.clear();
        self.set_state(state);
    }

    // ==================== Incoming messages ====================

    /// Handle one text frame from the hub
    pub fn handle_frame(&mut self, text: &str) {
        match ServerMessage::decode(text) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                warn!(error = %e, "Discarding malformed frame");
                self.stats.discarded_messages += 1;
            }
        }
    }

    /// Dispatch one message according to the current state
    pub fn handle_message(&mut self, msg: ServerMessage) {
        match (self.state, msg) {
            (SessionState::AwaitingInitialSync, ServerMessage::Sync { update }) => {
                self.complete_handshake(&update);
            }
            (SessionState::AwaitingInitialSync, ServerMessage::Update { update }) => {
                self.hold_update(update);
            }
            (
                SessionState::Active,
                ServerMessage::Sync { update } | ServerMessage::Update { update },
            ) => {
                self.flush_local_edit();
                self.apply_or_discard(&update);
            }
            (_, ServerMessage::Error { message }) => {
                warn!(doc_id = %self.identity.document_id(), "Hub error: {}", message);
                self.emit(SessionEvent::ServerError(message));
            }
            (_, ServerMessage::Info { message }) => {
                info!(doc_id = %self.identity.document_id(), "Hub info: {}", message);
                self.emit(SessionEvent::Info(message));
            }
            (state, msg) => {
                debug!(state = ?state, kind = msg.kind(), "Discarding message");
                self.stats.discarded_messages += 1;
            }
        }
    }

    fn complete_handshake(&mut self, snapshot: &str) {
        // The repaint below overwrites the view, so keep what was typed
        let draft = (self.deferred_edit || self.debouncer.is_pending())
            .then(|| self.view.content().to_string());

        if let Err(e) = self.apply_remote(snapshot) {
            warn!(error = %e, "Discarding initial snapshot");
            self.stats.discarded_messages += 1;
            return;
        }
        self.stats.applied_deltas += 1;
        self.set_state(SessionState::Active);

        let held: Vec<String> = self.pending_updates.drain(..).collect();
        for update in held {
            self.apply_or_discard(&update);
        }

        if !self.sync_requested {
            let summary = encode_summary(&self.replica.causal_summary());
            if self.send(ClientMessage::sync_request(summary)) {
                self.stats.sync_requests += 1;
            }
            self.sync_requested = true;
        }

        if let Some(draft) = draft {
            self.replay_draft(draft);
        }
    }

    /// Push an edit made before the snapshot on top of it
    fn replay_draft(&mut self, draft: String) {
        self.deferred_edit = false;
        self.debouncer.cancel();
        if self.view.set_content(draft.clone()) {
            self.emit(SessionEvent::Repaint(draft));
        }
        if let Err(e) = self.materialize() {
            warn!(error = %e, "Failed to apply edit made before initial sync");
        }
    }

    fn hold_update(&mut self, update: String) {
        if self.pending_updates.len() >= MAX_PENDING_UPDATES {
            warn!("Too many updates before initial sync, dropping one");
            self.stats.discarded_messages += 1;
            return;
        }
        debug!("Holding update until initial sync");
        self.pending_updates.push_back(update);
    }

    fn apply_or_discard(&mut self, update: &str) {
        match self.apply_remote(update) {
            Ok(()) => self.stats.applied_deltas += 1,
            Err(e) => {
                warn!(error = %e, "Discarding remote update");
                self.stats.discarded_messages += 1;
            }
        }
    }

    // ==================== View ====================

    /// Paint the stored snapshot loaded by the persistence fallback
    ///
    /// Once the live snapshot has been applied only the title is taken.
    pub fn paint_snapshot(&mut self, snapshot: ViewSnapshot) {
        self.emit(SessionEvent::TitleChanged(snapshot.title.clone()));
        if self.state == SessionState::Active {
            self.view.set_title(snapshot.title);
            return;
        }
        let content = snapshot.content.clone();
        self.view.paint(snapshot);
        self.emit(SessionEvent::Repaint(content));
    }

    pub fn set_title(&mut self, title: String) {
        self.view.set_title(title.clone());
        self.emit(SessionEvent::TitleChanged(title));
    }

    pub fn report_load_failure(&mut self, reason: String) {
        self.emit(SessionEvent::LoadFailed(reason));
    }

    pub fn report_save_failure(&mut self, reason: String) {
        self.emit(SessionEvent::SaveFailed(reason));
    }

    // ==================== Outgoing ====================

    /// Queue a message for the hub
    ///
    /// Dropped, not queued, unless the session is active.
    pub(super) fn send(&mut self, msg: ClientMessage) -> bool {
        if self.state != SessionState::Active {
            debug!(state = ?self.state, "Dropping outgoing message");
            return false;
        }
        self.outgoing.push_back(msg);
        true
    }

    pub(super) fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Session state changed");
        self.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    pub(super) fn emit(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }

    /// Deadline of the pending local materialization, if any
    pub fn materialize_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::encode_delta;
    use crate::replica::{AutomergeReplica, CausalSummary, Delta};
    use crate::view::PLACEHOLDER;

    /// Replica wrapper that counts calls into the engine
    pub(crate) struct CountingReplica {
        pub inner: AutomergeReplica,
        pub applies: usize,
        pub replaces: usize,
    }

    impl CountingReplica {
        pub fn new() -> Self {
            Self {
                inner: AutomergeReplica::new(),
                applies: 0,
                replaces: 0,
            }
        }
    }

    impl ReplicaEngine for CountingReplica {
        fn text(&self) -> Result<String, ReplicaError> {
            self.inner.text()
        }

        fn apply(&mut self, delta: &Delta) -> Result<(), ReplicaError> {
            self.applies += 1;
            self.inner.apply(delta)
        }

        fn replace_text(&mut self, text: &str) -> Result<(), ReplicaError> {
            self.replaces += 1;
            self.inner.replace_text(text)
        }

        fn causal_summary(&mut self) -> CausalSummary {
            self.inner.causal_summary()
        }

        fn take_change(&mut self) -> Option<Delta> {
            self.inner.take_change()
        }
    }

    pub(crate) fn identity() -> DocumentIdentity {
        DocumentIdentity::new("42", "alice").unwrap()
    }

    pub(crate) fn active_session() -> SyncSession<CountingReplica> {
        let mut session = SyncSession::new(identity(), CountingReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });
        session.take_outgoing();
        session.take_events();
        session
    }

    /// Delta that turns an empty document into `text`, made by another client
    pub(crate) fn remote_delta(text: &str) -> String {
        let mut peer = AutomergeReplica::new();
        peer.replace_text(text).unwrap();
        encode_delta(&peer.take_change().unwrap())
    }

    fn sync_requests(messages: &[ClientMessage]) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, ClientMessage::SyncRequest { .. }))
            .count()
    }

    #[test]
    fn test_starts_connecting() {
        let session = SyncSession::new(identity(), AutomergeReplica::new());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_empty_snapshot_handshake() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        assert_eq!(session.state(), SessionState::AwaitingInitialSync);

        session.handle_frame(r#"{"type":"sync","update":""}"#);

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.view().display_text(), PLACEHOLDER);
        let outgoing = session.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(sync_requests(&outgoing), 1);
    }

    #[test]
    fn test_sync_request_carries_causal_summary() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: remote_delta("shared"),
        });

        assert_eq!(session.replica().text().unwrap(), "shared");

        match session.take_outgoing().as_slice() {
            [ClientMessage::SyncRequest { state_vector }] => {
                // One head, 32 bytes
                assert_eq!(state_vector.len(), 64);
            }
            other => panic!("Expected one sync_request, got {:?}", other),
        }
    }

    #[test]
    fn test_at_most_one_sync_request() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });
        session.handle_message(ServerMessage::Sync {
            update: remote_delta("again"),
        });
        session.handle_message(ServerMessage::Update {
            update: remote_delta("more"),
        });

        assert_eq!(sync_requests(&session.take_outgoing()), 1);
        assert_eq!(session.stats().sync_requests, 1);
    }

    #[test]
    fn test_no_sync_request_before_snapshot() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Update {
            update: remote_delta("early"),
        });
        session.handle_message(ServerMessage::Info {
            message: "hello".to_string(),
        });

        assert!(session.take_outgoing().is_empty());
        assert_eq!(session.state(), SessionState::AwaitingInitialSync);
        assert_eq!(session.replica().text().unwrap(), "");
    }

    #[test]
    fn test_remote_update_is_not_echoed() {
        let mut session = active_session();

        session.handle_frame(&format!(
            r#"{{"type":"update","update":"{}"}}"#,
            remote_delta("World")
        ));

        assert_eq!(session.view().content(), "World");
        assert!(session.take_outgoing().is_empty());
        assert_eq!(session.stats().sent_updates, 0);
        assert_eq!(session.stats().suppressed_echoes, 1);
        assert!(session
            .take_events()
            .contains(&SessionEvent::Repaint("World".to_string())));
    }

    #[test]
    fn test_one_apply_per_message() {
        let mut session = active_session();
        let applies_before = session.replica().applies;

        let update = remote_delta("World");
        session.handle_message(ServerMessage::Update {
            update: update.clone(),
        });
        session.handle_message(ServerMessage::Update { update });

        assert_eq!(session.replica().applies - applies_before, 2);
        assert_eq!(session.view().content(), "World");
        assert_eq!(session.replica().text().unwrap(), "World");
    }

    #[test]
    fn test_updates_apply_in_order() {
        let mut peer = AutomergeReplica::new();
        let snapshot = encode_delta(&peer.snapshot());
        peer.replace_text("A").unwrap();
        let a = encode_delta(&peer.take_change().unwrap());
        peer.replace_text("AB").unwrap();
        let b = encode_delta(&peer.take_change().unwrap());

        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Sync { update: snapshot });
        session.handle_message(ServerMessage::Update { update: a });
        session.handle_message(ServerMessage::Update { update: b });

        assert_eq!(session.view().content(), "AB");
        assert_eq!(session.view().content(), peer.text().unwrap());
    }

    #[test]
    fn test_early_updates_held_until_snapshot() {
        let mut peer = AutomergeReplica::new();
        peer.replace_text("A").unwrap();
        let a = encode_delta(&peer.take_change().unwrap());

        let mut session = SyncSession::new(identity(), CountingReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Update { update: a });
        assert_eq!(session.replica().applies, 0);

        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });

        assert_eq!(session.replica().applies, 2);
        assert_eq!(session.view().content(), "A");
        let outgoing = session.take_outgoing();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(sync_requests(&outgoing), 1);
    }

    #[test]
    fn test_malformed_delta_keeps_session_active() {
        let mut session = active_session();
        session.handle_message(ServerMessage::Update {
            update: remote_delta("ok"),
        });

        session.handle_frame(r#"{"type":"update","update":"abc"}"#);
        session.handle_frame(r#"{"type":"update","update":"zz"}"#);
        session.handle_frame("garbage");

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.replica().text().unwrap(), "ok");
        assert_eq!(session.stats().discarded_messages, 3);
    }

    #[test]
    fn test_malformed_snapshot_keeps_waiting() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_frame(r#"{"type":"sync","update":"0"}"#);

        assert_eq!(session.state(), SessionState::AwaitingInitialSync);
        assert!(session.take_outgoing().is_empty());
    }

    #[test]
    fn test_server_error_is_not_fatal() {
        let mut session = active_session();
        session.handle_frame(r#"{"type":"error","message":"Invalid JSON"}"#);

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(
            session.take_events(),
            vec![SessionEvent::ServerError("Invalid JSON".to_string())]
        );
    }

    #[test]
    fn test_close_is_terminal() {
        let mut session = active_session();
        session.connection_closed();
        assert_eq!(session.state(), SessionState::Closed);

        session.connection_failed();
        assert_eq!(session.state(), SessionState::Closed);

        session.handle_message(ServerMessage::Update {
            update: remote_delta("late"),
        });
        assert_eq!(session.replica().text().unwrap(), "");
    }

    #[test]
    fn test_handshake_timeout_fails_only_while_waiting() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handshake_timed_out();
        assert_eq!(session.state(), SessionState::Failed);

        let mut session = active_session();
        session.handshake_timed_out();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_state_change_events() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });
        session.connection_closed();

        let states: Vec<_> = session
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::AwaitingInitialSync,
                SessionState::Active,
                SessionState::Closed
            ]
        );
    }

    #[test]
    fn test_stored_snapshot_painted_before_sync() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.paint_snapshot(ViewSnapshot {
            title: "Plan".to_string(),
            content: "stored".to_string(),
        });
        assert_eq!(session.view().content(), "stored");
        assert_eq!(session.view().title(), "Plan");

        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: remote_delta("live"),
        });
        assert_eq!(session.view().content(), "live");
        assert_eq!(session.view().title(), "Plan");
    }

    fn updates(messages: &[ClientMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|m| match m {
                ClientMessage::Update { update } => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_edit_before_sync_is_sent_after_snapshot() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();

        let start = Instant::now();
        session.local_edit("typed while waiting".to_string(), start);
        assert!(!session
            .poll_materialize(start + Duration::from_millis(200))
            .unwrap());

        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });

        assert_eq!(session.view().content(), "typed while waiting");
        assert_eq!(session.replica().text().unwrap(), "typed while waiting");

        let outgoing = session.take_outgoing();
        assert!(matches!(outgoing[0], ClientMessage::SyncRequest { .. }));
        let sent = updates(&outgoing);
        assert_eq!(sent.len(), 1);

        let mut hub = AutomergeReplica::new();
        hub.apply(&crate::codec::decode_delta(&sent[0]).unwrap())
            .unwrap();
        assert_eq!(hub.text().unwrap(), "typed while waiting");

        assert_eq!(
            session.take_events().last(),
            Some(&SessionEvent::Repaint("typed while waiting".to_string()))
        );
    }

    #[test]
    fn test_pending_edit_during_handshake_survives_snapshot() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.connection_established();
        session.local_edit("draft".to_string(), Instant::now());

        session.handle_message(ServerMessage::Sync {
            update: remote_delta("shared"),
        });

        assert!(session.materialize_deadline().is_none());
        let text = session.replica().text().unwrap();
        assert_eq!(text, "draft");
        assert_eq!(session.view().content(), "draft");
        assert_eq!(updates(&session.take_outgoing()).len(), 1);
    }

    #[test]
    fn test_stored_snapshot_is_not_pushed() {
        let mut session = SyncSession::new(identity(), AutomergeReplica::new());
        session.paint_snapshot(ViewSnapshot {
            title: "Plan".to_string(),
            content: "stored".to_string(),
        });
        session.connection_established();
        session.handle_message(ServerMessage::Sync {
            update: String::new(),
        });

        assert!(updates(&session.take_outgoing()).is_empty());
        assert_eq!(session.view().content(), "");
    }
}
