//! Remote update applier
//!
//! Applies deltas from the hub to the replica and repaints the view. The
//! replica reports every mutation through the same change notification, so
//! the echo-suppression flag is raised around each apply to keep remote
//! changes out of the outgoing path.

use tracing::trace;

use super::message::ClientMessage;
use super::session::{SessionError, SessionEvent, SyncSession};
use crate::codec::{decode_delta, encode_delta};
use crate::replica::ReplicaEngine;

impl<E: ReplicaEngine> SyncSession<E> {
    /// Decode and apply one remote delta, then repaint
    ///
    /// A delta that fails to decode never reaches the replica.
    pub(super) fn apply_remote(&mut self, payload: &str) -> Result<(), SessionError> {
        let delta = decode_delta(payload)?;

        self.applying_remote = true;
        let applied = self.replica.apply(&delta);
        self.on_replica_change();
        self.applying_remote = false;
        applied?;

        trace!(bytes = delta.len(), "Applied remote delta");
        self.repaint()
    }

    /// Handle the replica's change notification
    ///
    /// Local changes are sent to the hub; changes raised while a remote delta
    /// is being applied are dropped.
    pub(super) fn on_replica_change(&mut self) {
        while let Some(delta) = self.replica.take_change() {
            if self.applying_remote {
                trace!("Suppressing echo of remote delta");
                self.stats.suppressed_echoes += 1;
                continue;
            }
            if self.send(ClientMessage::update(encode_delta(&delta))) {
                self.stats.sent_updates += 1;
            }
        }
    }

    /// Copy the replica's text into the view if it differs
    fn repaint(&mut self) -> Result<(), SessionError> {
        let text = self.replica.text()?;
        if self.view.set_content(text.clone()) {
            self.emit(SessionEvent::Repaint(text));
        }
        Ok(())
    }
}
