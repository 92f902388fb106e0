use std::collections::{BTreeMap, BTreeSet};

use crate::{
    analysis::cfg::block::{BasicBlock, BlockEntry},
    assembly::{ExceptionClause, FlowType, InstrId, InstructionList, NodeKind},
    Result,
};

/// The block graph of one method.
///
/// Blocks are stored in a [`BTreeMap`] keyed by entry instruction, so iteration follows the
/// instruction order of the method.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    blocks: BTreeMap<InstrId, BasicBlock>,
}

impl ControlFlowGraph {
    /// Partitions `list` into basic blocks and computes the block graph.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] if a branch target or clause boundary does
    /// not start a block after partitioning.
    pub fn build(list: &InstructionList, clauses: &[ExceptionClause]) -> Result<Self> {
        if list.is_empty() {
            return Ok(ControlFlowGraph::default());
        }

        let leaders = collect_leaders(list, clauses);
        let mut blocks = partition(list, &leaders);

        let keys: Vec<InstrId> = blocks.keys().copied().collect();
        for key in &keys {
            let successors = match blocks.get(key) {
                Some(block) => successors(list, block.exit),
                None => continue,
            };
            for succ in &successors {
                if !blocks.contains_key(succ) {
                    return Err(graph_error!(
                        "block {} flows to {}, which does not start a block",
                        key,
                        succ
                    ));
                }
            }
            if let Some(block) = blocks.get_mut(key) {
                block.successors = successors;
            }
        }

        for key in &keys {
            let successors = blocks[key].successors.clone();
            for succ in successors {
                if let Some(target) = blocks.get_mut(&succ) {
                    if !target.predecessors.contains(key) {
                        target.predecessors.push(*key);
                    }
                }
            }
        }

        for clause in clauses {
            let ty = clause.exception_type();
            if let Some(block) = blocks.get_mut(&clause.handler_begin) {
                block.entry_kind = BlockEntry::Handler(ty.clone());
            }
            if let Some(entry) = clause.filter_entry() {
                if let Some(block) = blocks.get_mut(&entry) {
                    block.entry_kind = BlockEntry::Filter(ty);
                }
            }
        }

        Ok(ControlFlowGraph { blocks })
    }

    /// Checks the structural invariants of the graph against the list and clauses it was built
    /// from.
    ///
    /// Every node belongs to exactly one block, every block without successors ends in a terminal
    /// instruction or right before the sentinel, and every clause boundary is a block entry or
    /// exit.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] describing the first violation.
    pub fn verify(&self, list: &InstructionList, clauses: &[ExceptionClause]) -> Result<()> {
        let covered: usize = self.blocks.values().map(|block| block.len).sum();
        if covered != list.len() {
            return Err(graph_error!(
                "blocks cover {} of {} nodes",
                covered,
                list.len()
            ));
        }

        let mut expected = list.first();
        for block in self.blocks.values() {
            if block.entry != expected {
                return Err(graph_error!(
                    "block {} does not start where the previous one ended ({})",
                    block.entry,
                    expected
                ));
            }
            expected = list.next(block.exit);

            if block.successors.is_empty()
                && !list[block.exit].flow().is_terminal()
                && !list.next(block.exit).is_back()
            {
                return Err(graph_error!(
                    "block {} ends in '{}' without successors",
                    block.entry,
                    list[block.exit]
                ));
            }
        }

        for clause in clauses {
            let boundaries = [
                (clause.try_begin, true),
                (clause.try_end, false),
                (clause.handler_begin, true),
                (clause.handler_end, false),
            ];
            for (id, is_begin) in boundaries {
                let aligned = if is_begin {
                    self.blocks.contains_key(&id)
                } else {
                    self.block_containing(id).is_some_and(|block| block.exit == id)
                };
                if !aligned {
                    return Err(graph_error!(
                        "clause {} boundary {} is not a block boundary",
                        clause.index,
                        id
                    ));
                }
            }
            if let Some(entry) = clause.filter_entry() {
                if !self.blocks.contains_key(&entry) {
                    return Err(graph_error!(
                        "clause {} filter entry {} does not start a block",
                        clause.index,
                        entry
                    ));
                }
            }
        }
        Ok(())
    }

    /// Entry block key, [`InstrId::BACK`] for an empty method.
    #[must_use]
    pub fn entry(&self) -> InstrId {
        self.blocks.keys().next().copied().unwrap_or(InstrId::BACK)
    }

    /// Block starting at `entry`.
    #[must_use]
    pub fn block(&self, entry: InstrId) -> Option<&BasicBlock> {
        self.blocks.get(&entry)
    }

    /// Block containing the node `id`.
    #[must_use]
    pub fn block_containing(&self, id: InstrId) -> Option<&BasicBlock> {
        self.blocks
            .range(..=id)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| block.contains(id))
    }

    /// Blocks in instruction order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` for a method without instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Successor keys of the block at `entry`.
    #[must_use]
    pub fn successors(&self, entry: InstrId) -> &[InstrId] {
        self.blocks
            .get(&entry)
            .map_or(&[], |block| block.successors.as_slice())
    }

    /// Predecessor keys of the block at `entry`.
    #[must_use]
    pub fn predecessors(&self, entry: InstrId) -> &[InstrId] {
        self.blocks
            .get(&entry)
            .map_or(&[], |block| block.predecessors.as_slice())
    }

    /// Successor map, for consumers that want plain adjacency.
    #[must_use]
    pub fn successor_map(&self) -> BTreeMap<InstrId, Vec<InstrId>> {
        self.blocks
            .iter()
            .map(|(key, block)| (*key, block.successors.clone()))
            .collect()
    }
}

/// Last node of a block that starts with `id` as far as the instruction itself is concerned:
/// a `switch` extends over its case nodes.
fn switch_end(list: &InstructionList, id: InstrId) -> InstrId {
    let mut end = id;
    while list[list.next(end)].kind == NodeKind::SwitchCase {
        end = list.next(end);
    }
    end
}

fn collect_leaders(list: &InstructionList, clauses: &[ExceptionClause]) -> BTreeSet<InstrId> {
    let mut leaders = BTreeSet::new();
    leaders.insert(list.first());

    for node in list {
        if node.kind == NodeKind::SwitchCase {
            if let Some(target) = node.target() {
                leaders.insert(target);
            }
            continue;
        }

        let flow = node.flow();
        if let Some(target) = node.target() {
            leaders.insert(target);
        }
        if flow.ends_block() {
            let end = if flow == FlowType::Switch {
                switch_end(list, node.id)
            } else {
                node.id
            };
            leaders.insert(list.next(end));
        }
    }

    for clause in clauses {
        leaders.insert(clause.try_begin);
        leaders.insert(list.next(clause.try_end));
        leaders.insert(clause.handler_begin);
        leaders.insert(list.next(clause.handler_end));
        if let Some(entry) = clause.filter_entry() {
            leaders.insert(entry);
        }
    }

    leaders.remove(&InstrId::BACK);
    leaders
}

fn partition(list: &InstructionList, leaders: &BTreeSet<InstrId>) -> BTreeMap<InstrId, BasicBlock> {
    let mut blocks = BTreeMap::new();
    let mut current: Option<BasicBlock> = None;

    for node in list {
        if leaders.contains(&node.id) {
            if let Some(done) = current.take() {
                blocks.insert(done.entry, done);
            }
            current = Some(BasicBlock::new(node.id));
        }
        if let Some(block) = current.as_mut() {
            block.exit = node.id;
            block.len += 1;
        }
    }
    if let Some(done) = current {
        blocks.insert(done.entry, done);
    }
    blocks
}

/// Successors of a block ending in `exit`, in branch order with the fallthrough last.
fn successors(list: &InstructionList, exit: InstrId) -> Vec<InstrId> {
    let node = &list[exit];
    let fallthrough = list.next(exit);
    let mut result = Vec::new();

    if node.kind == NodeKind::SwitchCase {
        let mut case = exit;
        let mut targets = Vec::new();
        while list[case].kind == NodeKind::SwitchCase {
            if let Some(target) = list[case].target() {
                targets.push(target);
            }
            case = list.prev(case);
        }
        targets.reverse();
        result.extend(targets);
        result.push(fallthrough);
    } else {
        let flow = node.flow();
        match flow {
            FlowType::ConditionalBranch => {
                result.extend(node.target());
                result.push(fallthrough);
            }
            FlowType::UnconditionalBranch | FlowType::Leave => result.extend(node.target()),
            _ if flow.is_terminal() => {}
            _ => result.push(fallthrough),
        }
    }

    let mut unique = Vec::with_capacity(result.len());
    for id in result {
        if !id.is_back() && !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
