//! Replica engine
//!
//! The CRDT itself is an external capability. The sync client only drives it
//! through [`ReplicaEngine`]; [`AutomergeReplica`] adapts an Automerge
//! document to that surface.
//!
//! ## Document structure
//!
//! ```text
//! ROOT
//! └── content: Text
//! ```
//!
//! The `content` object is created by a deterministic change (fixed actor,
//! time 0) so that every replica starts from the same change and edits made
//! by different clients land in the same text object.

use automerge::transaction::{CommitOptions, Transactable};
use automerge::{ActorId, AutoCommit, ChangeHash, ObjId, ObjType, ReadDoc, Value, ROOT};
use thiserror::Error;

/// Errors raised by the replica engine
#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error("Automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    #[error("Document has no text content object")]
    MissingContent,
}

/// An opaque unit of change produced by and applicable to a replica
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta(Vec<u8>);

impl Delta {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for Delta {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Compact descriptor of what a replica has already seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CausalSummary(Vec<u8>);

impl CausalSummary {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for CausalSummary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Capability surface the sync client needs from a mergeable text value
pub trait ReplicaEngine {
    /// Current textual projection
    fn text(&self) -> Result<String, ReplicaError>;

    /// Merge a delta. Must be idempotent and tolerate reordering.
    fn apply(&mut self, delta: &Delta) -> Result<(), ReplicaError>;

    /// Replace the whole content in one atomic mutation
    fn replace_text(&mut self, text: &str) -> Result<(), ReplicaError>;

    /// Summary of the current state, used to ask the hub for missing deltas
    fn causal_summary(&mut self) -> CausalSummary;

    /// Change notification
    ///
    /// Returns the delta produced by mutations since the last call, whatever
    /// caused them (local replace or remote apply). Each change is reported
    /// once.
    fn take_change(&mut self) -> Option<Delta>;
}

/// Key of the text object at the document root
const CONTENT_KEY: &str = "content";

/// Actor used only for the shared initial change
const INIT_ACTOR: [u8; 16] = [0; 16];

/// A replica backed by an Automerge document
pub struct AutomergeReplica {
    doc: AutoCommit,
    /// Heads already reported through `take_change`
    observed: Vec<ChangeHash>,
}

impl AutomergeReplica {
    /// Create an empty replica
    pub fn new() -> Self {
        let mut doc = AutoCommit::new().with_actor(ActorId::from(&INIT_ACTOR[..]));
        doc.put_object(ROOT, CONTENT_KEY, ObjType::Text)
            .expect("Failed to create content text");
        doc.commit_with(CommitOptions::default().with_time(0));
        doc.set_actor(ActorId::random());

        let observed = doc.get_heads();
        Self { doc, observed }
    }

    /// Load a replica from a saved document
    pub fn load(bytes: &[u8]) -> Result<Self, ReplicaError> {
        let mut doc = AutoCommit::load(bytes)?;
        let observed = doc.get_heads();
        Ok(Self { doc, observed })
    }

    /// Full state as a single delta (what a hub sends as its snapshot)
    pub fn snapshot(&mut self) -> Delta {
        Delta(self.doc.save())
    }

    fn content_id(&self) -> Option<ObjId> {
        match self.doc.get(ROOT, CONTENT_KEY) {
            Ok(Some((Value::Object(ObjType::Text), id))) => Some(id),
            _ => None,
        }
    }
}

impl Default for AutomergeReplica {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaEngine for AutomergeReplica {
    fn text(&self) -> Result<String, ReplicaError> {
        match self.content_id() {
            Some(id) => Ok(self.doc.text(&id)?),
            None => Ok(String::new()),
        }
    }

    fn apply(&mut self, delta: &Delta) -> Result<(), ReplicaError> {
        if delta.is_empty() {
            return Ok(());
        }
        self.doc.load_incremental(delta.as_bytes())?;
        Ok(())
    }

    fn replace_text(&mut self, text: &str) -> Result<(), ReplicaError> {
        let id = match self.content_id() {
            Some(id) => id,
            None => self.doc.put_object(ROOT, CONTENT_KEY, ObjType::Text)?,
        };

        let current = self.doc.text(&id)?;
        if current == text {
            return Ok(());
        }

        let splice = TextSplice::between(&current, text);
        self.doc
            .splice_text(&id, splice.pos, splice.delete as isize, &splice.insert)?;
        self.doc.commit();
        Ok(())
    }

    fn causal_summary(&mut self) -> CausalSummary {
        let bytes = self
            .doc
            .get_heads()
            .iter()
            .flat_map(|hash| hash.0)
            .collect();
        CausalSummary(bytes)
    }

    fn take_change(&mut self) -> Option<Delta> {
        let heads = self.doc.get_heads();
        if heads == self.observed {
            return None;
        }
        let bytes = self.doc.save_after(&self.observed);
        self.observed = heads;
        Some(Delta(bytes))
    }
}

/// Minimal single splice turning one string into another (char positions)
#[derive(Debug, PartialEq, Eq)]
struct TextSplice {
    pos: usize,
    delete: usize,
    insert: String,
}

impl TextSplice {
    fn between(old: &str, new: &str) -> Self {
        let old: Vec<char> = old.chars().collect();
        let new: Vec<char> = new.chars().collect();

        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        Self {
            pos: prefix,
            delete: old.len() - prefix - suffix,
            insert: new[prefix..new.len() - suffix].iter().collect(),
        }
    }
}
