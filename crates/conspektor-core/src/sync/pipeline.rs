//! Local edit pipeline
//!
//! Raw edit events update the view mirror and restart a debounce timer. When
//! the editor has been quiet for the whole window the view content is
//! materialized into the replica as one atomic replace, which yields at most
//! one outgoing delta per window.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::session::{SessionError, SessionState, SyncSession};
use crate::replica::ReplicaEngine;

/// Restartable quiet-period timer
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record an event, pushing the deadline out by a full window
    pub fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

impl<E: ReplicaEngine> SyncSession<E> {
    /// A raw edit event from the editor, carrying its current content
    pub fn local_edit(&mut self, content: String, now: Instant) {
        self.view.set_content(content);
        self.debouncer.record(now);
    }

    /// Materialize the pending edit if the debounce window has elapsed
    ///
    /// Returns true if the replica changed.
    pub fn poll_materialize(&mut self, now: Instant) -> Result<bool, SessionError> {
        if !self.debouncer.is_due(now) {
            return Ok(false);
        }
        self.debouncer.cancel();
        self.materialize()
    }

    /// Materialize a pending edit right away, ignoring the window
    pub fn flush_local_edit(&mut self) {
        if !self.debouncer.is_pending() {
            return;
        }
        self.debouncer.cancel();
        if let Err(e) = self.materialize() {
            tracing::warn!(error = %e, "Failed to materialize local edit");
        }
    }

    /// Push the view content into the replica
    ///
    /// Deferred while the session is not active, since the resulting delta
    /// could not be sent. A deferred edit is replayed once the initial sync
    /// completes.
    pub fn materialize(&mut self) -> Result<bool, SessionError> {
        if self.state != SessionState::Active {
            debug!(state = ?self.state, "Deferring materialization");
            self.deferred_edit = true;
            return Ok(false);
        }

        if self.replica.text()? == self.view.content() {
            return Ok(false);
        }

        self.replica.replace_text(self.view.content())?;
        self.on_replica_change();
        Ok(true)
    }
}
