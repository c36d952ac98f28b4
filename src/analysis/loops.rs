//! Loop detection.
//!
//! A back edge is any edge whose target starts at or below its source block.
//! This address-order rule approximates natural loops: it handles the
//! loops compilers emit for structured code and misses irreducible flow.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{Address, AsmFunction, BlockId};

/// One loop, keyed by its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub header: BlockId,
    pub header_address: Address,
    /// Sources of the back edges into `header`.
    pub tails: Vec<BlockId>,
    /// Every block of the loop, header included.
    pub members: BTreeSet<BlockId>,
    /// Members with at least one successor outside the loop.
    pub exits: BTreeSet<BlockId>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.members.contains(&block)
    }
}

/// All loops of a function.
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    by_header: BTreeMap<Address, Loop>,
    /// Headers of the loops containing each block, indexed by `BlockId`.
    by_block: Vec<Vec<Address>>,
}

impl LoopInfo {
    pub fn len(&self) -> usize {
        self.by_header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_header.is_empty()
    }

    /// Loops in header address order.
    pub fn iter(&self) -> impl Iterator<Item = &Loop> {
        self.by_header.values()
    }

    /// The loop headed by the block starting at `address`.
    pub fn by_header(&self, address: Address) -> Option<&Loop> {
        self.by_header.get(&address)
    }

    /// Loops containing `block`, outermost header first.
    pub fn containing(&self, block: BlockId) -> impl Iterator<Item = &Loop> {
        self.by_block
            .get(block.0)
            .into_iter()
            .flatten()
            .filter_map(|header| self.by_header.get(header))
    }
}

/// Find every loop of `function`.
pub fn analyze(function: &AsmFunction) -> LoopInfo {
    let mut by_header: BTreeMap<Address, Loop> = BTreeMap::new();

    for block in &function.blocks {
        for &succ in &block.successors {
            let header = function.block(succ);
            if header.start > block.start {
                continue;
            }

            let members = collect_members(function, header.id, block.id);
            let entry = by_header.entry(header.start).or_insert_with(|| Loop {
                header: header.id,
                header_address: header.start,
                tails: Vec::new(),
                members: BTreeSet::new(),
                exits: BTreeSet::new(),
            });
            entry.tails.push(block.id);
            entry.members.extend(members);
        }
    }

    let mut by_block = vec![Vec::new(); function.blocks.len()];
    for lp in by_header.values_mut() {
        lp.exits = lp
            .members
            .iter()
            .copied()
            .filter(|m| {
                function
                    .block(*m)
                    .successors
                    .iter()
                    .any(|s| !lp.members.contains(s))
            })
            .collect();
        for member in &lp.members {
            by_block[member.0].push(lp.header_address);
        }
    }

    log::debug!(
        "Loop analysis of 0x{:08X}: {} loops",
        function.entry,
        by_header.len()
    );
    LoopInfo {
        by_header,
        by_block,
    }
}

/// Walk predecessors backwards from `tail`, never past `header`, then keep
/// the blocks the header reaches without leaving that set.
fn collect_members(function: &AsmFunction, header: BlockId, tail: BlockId) -> BTreeSet<BlockId> {
    let mut candidates = BTreeSet::from([header]);
    let mut queue = VecDeque::from([tail]);

    while let Some(id) = queue.pop_front() {
        if !candidates.insert(id) {
            continue;
        }
        for pred in &function.block(id).predecessors {
            if !candidates.contains(pred) {
                queue.push_back(*pred);
            }
        }
    }

    // a jump into the middle of the loop drags its source in
    let mut members = BTreeSet::new();
    let mut queue = VecDeque::from([header]);
    while let Some(id) = queue.pop_front() {
        if !members.insert(id) {
            continue;
        }
        for succ in &function.block(id).successors {
            if candidates.contains(succ) && !members.contains(succ) {
                queue.push_back(*succ);
            }
        }
    }
    members
}
