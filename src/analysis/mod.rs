//! Analyses over a function's CFG.
//!
//! Each pass writes one typed slot of the function's [`AnalyzerContext`].
//! The engine runs them in a fixed order: loops, data flow, variables,
//! structures.

pub mod dataflow;
pub mod loops;
pub mod structure;
pub mod variables;

use std::collections::HashMap;

use crate::{Address, BlockId};

use self::dataflow::RegisterSnapshot;
use self::loops::LoopInfo;
use self::structure::Structure;

/// Per-function analysis results.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerContext {
    pub loops: LoopInfo,
    /// Register state after each instruction, keyed by instruction address.
    pub registers: HashMap<Address, RegisterSnapshot>,
    /// Structure headed by each block, indexed by `BlockId`.
    pub structures: Vec<Option<Structure>>,
}

impl AnalyzerContext {
    /// Register snapshot taken after the instruction at `address`.
    pub fn snapshot_after(&self, address: Address) -> Option<&RegisterSnapshot> {
        self.registers.get(&address)
    }

    pub fn structure(&self, block: BlockId) -> Option<&Structure> {
        self.structures.get(block.0).and_then(|s| s.as_ref())
    }
}
