//! Per-call reference tables.
//!
//! The writer assigns sequence indices to nodes in first-visit order; the
//! reader rebuilds the same index → node mapping as new references arrive.
//! Both tables live only for the duration of one call.

use rustc_hash::FxHashMap;

use crate::error::DecodeError;
use crate::model::NodeId;

/// Outcome of visiting a node while writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    /// First visit: write the index and the full node.
    New(usize),
    /// Seen before: write only the index.
    Back(usize),
}

/// Identity → index table used while serializing.
#[derive(Debug, Default)]
pub(crate) struct WriteRefs {
    seen: FxHashMap<NodeId, usize>,
}

impl WriteRefs {
    pub fn visit(&mut self, id: NodeId) -> Visit {
        let next = self.seen.len();
        match self.seen.get(&id) {
            Some(&index) => Visit::Back(index),
            None => {
                self.seen.insert(id, next);
                Visit::New(next)
            }
        }
    }
}

/// Index → node table used while deserializing.
#[derive(Debug, Default)]
pub(crate) struct ReadRefs {
    nodes: Vec<NodeId>,
}

impl ReadRefs {
    /// Records the node for a new reference; `index` must be the next one.
    pub fn assign(&mut self, index: u64, id: NodeId) -> Result<(), DecodeError> {
        let expected = self.nodes.len();
        if index != expected as u64 {
            return Err(DecodeError::ReferenceOutOfSequence {
                expected,
                found: usize::try_from(index).unwrap_or(usize::MAX),
            });
        }
        self.nodes.push(id);
        Ok(())
    }

    pub fn resolve(&self, index: u64) -> Result<NodeId, DecodeError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.nodes.get(i).copied())
            .ok_or(DecodeError::InvalidBackReference {
                index: usize::try_from(index).unwrap_or(usize::MAX),
                size: self.nodes.len(),
            })
    }
}
