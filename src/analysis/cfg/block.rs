//! Basic blocks over the decoded instruction list.

use std::fmt;

use crate::{assembly::InstrId, metadata::typesystem::TacType};

/// How a block is entered besides ordinary control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockEntry {
    /// Reached only through branches and fallthrough
    Normal,
    /// First block of an exception handler, entered with an exception of the given type
    Handler(TacType),
    /// First block of a filter predicate, entered with an exception of the given type
    Filter(TacType),
}

/// A maximal straight-line run of instructions.
///
/// Blocks are keyed by the id of their entry instruction. Every node of the list, switch cases
/// included, belongs to exactly one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// First node of the block, always a leader
    pub entry: InstrId,
    /// Last node of the block
    pub exit: InstrId,
    /// Number of nodes in the block
    pub len: usize,
    /// Entry keys of the blocks control can reach directly from this one
    pub successors: Vec<InstrId>,
    /// Entry keys of the blocks reaching this one directly
    pub predecessors: Vec<InstrId>,
    /// Exceptional entry, if any
    pub entry_kind: BlockEntry,
}

impl BasicBlock {
    pub(crate) fn new(entry: InstrId) -> Self {
        BasicBlock {
            entry,
            exit: entry,
            len: 0,
            successors: Vec::new(),
            predecessors: Vec::new(),
            entry_kind: BlockEntry::Normal,
        }
    }

    /// Type of the exception on the stack at entry, for handler and filter entries.
    #[must_use]
    pub fn handler_type(&self) -> Option<&TacType> {
        match &self.entry_kind {
            BlockEntry::Normal => None,
            BlockEntry::Handler(ty) | BlockEntry::Filter(ty) => Some(ty),
        }
    }

    /// Returns `true` if `id` lies between the entry and exit of this block.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        self.entry <= id && id <= self.exit
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}..{} ->", self.entry, self.exit)?;
        for succ in &self.successors {
            write!(f, " {succ}")?;
        }
        Ok(())
    }
}
