//! Arena-backed, circular, doubly linked instruction list.
//!
//! Nodes are stored in a `Vec` and link to each other through [`InstrId`] indices. The sentinel
//! is kept outside the arena under [`InstrId::BACK`]; its `next` is the first instruction and its
//! `prev` the last, closing the circle. Because `next`/`prev` are only written by
//! [`InstructionList::push_back`], they always stay mutually consistent.

use std::{collections::HashMap, ops::Index};

use crate::assembly::instruction::{InstrId, Instruction, NodeKind, Operand};

/// The decoded instruction stream of one method.
#[derive(Debug, Clone)]
pub struct InstructionList {
    nodes: Vec<Instruction>,
    back: Instruction,
    offsets: HashMap<u32, InstrId>,
}

impl Default for InstructionList {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionList {
    /// Creates an empty list holding only the sentinel.
    #[must_use]
    pub fn new() -> Self {
        let mut offsets = HashMap::new();
        offsets.insert(0, InstrId::BACK);
        InstructionList {
            nodes: Vec::new(),
            back: Instruction {
                id: InstrId::BACK,
                kind: NodeKind::Back,
                offset: 0,
                size: 0,
                operand: Operand::None,
                prev: InstrId::BACK,
                next: InstrId::BACK,
            },
            offsets,
        }
    }

    /// Appends a node before the sentinel and returns its id.
    ///
    /// Real instructions are registered in the offset map; switch cases are not, since they
    /// cannot be branch targets. The sentinel moves to the end of the appended node.
    pub fn push_back(&mut self, kind: NodeKind, offset: u32, size: u32, operand: Operand) -> InstrId {
        #[allow(clippy::cast_possible_truncation)]
        let id = InstrId(self.nodes.len() as u32);
        let prev = self.back.prev;

        self.nodes.push(Instruction {
            id,
            kind,
            offset,
            size,
            operand,
            prev,
            next: InstrId::BACK,
        });
        if prev.is_back() {
            self.back.next = id;
        } else {
            self.nodes[prev.index()].next = id;
        }
        self.back.prev = id;

        self.offsets.remove(&self.back.offset);
        if matches!(kind, NodeKind::Op(_)) {
            self.offsets.insert(offset, id);
        }
        self.back.offset = offset + size;
        self.offsets.insert(self.back.offset, InstrId::BACK);
        id
    }

    /// First instruction, the sentinel if the list is empty.
    #[must_use]
    pub fn first(&self) -> InstrId {
        self.back.next
    }

    /// Last instruction, the sentinel if the list is empty.
    #[must_use]
    pub fn last(&self) -> InstrId {
        self.back.prev
    }

    /// Node following `id`.
    #[must_use]
    pub fn next(&self, id: InstrId) -> InstrId {
        self[id].next
    }

    /// Node preceding `id`.
    #[must_use]
    pub fn prev(&self, id: InstrId) -> InstrId {
        self[id].prev
    }

    /// Returns the node starting at byte `offset`.
    ///
    /// The end of the stream maps to the sentinel, so a range ending at the end of the method
    /// resolves like any other.
    #[must_use]
    pub fn node_at(&self, offset: u32) -> Option<InstrId> {
        self.offsets.get(&offset).copied()
    }

    /// Node lookup that tolerates ids outside the arena.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        if id.is_back() {
            Some(&self.back)
        } else {
            self.nodes.get(id.index())
        }
    }

    pub(crate) fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        if id.is_back() {
            Some(&mut self.back)
        } else {
            self.nodes.get_mut(id.index())
        }
    }

    /// Number of nodes, switch cases included, sentinel excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if only the sentinel is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of real instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.nodes.iter().filter(|node| !node.is_pseudo()).count()
    }

    /// Byte length of the decoded stream.
    #[must_use]
    pub fn code_len(&self) -> u32 {
        self.back.offset
    }

    /// Walks the list from the first node up to, not including, the sentinel.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            current: self.first(),
        }
    }
}

impl Index<InstrId> for InstructionList {
    type Output = Instruction;

    fn index(&self, id: InstrId) -> &Instruction {
        if id.is_back() {
            &self.back
        } else {
            &self.nodes[id.index()]
        }
    }
}

/// Iterator over the nodes of an [`InstructionList`] in link order.
pub struct Iter<'a> {
    list: &'a InstructionList,
    current: InstrId,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Instruction;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_back() {
            return None;
        }
        let node = &self.list[self.current];
        self.current = node.next;
        Some(node)
    }
}

impl<'a> IntoIterator for &'a InstructionList {
    type Item = &'a Instruction;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
