//! If/else and switch recovery.

use crate::instruction::{FlowKind, Mnemonic};
use crate::operand::Operand;
use crate::{AsmFunction, BlockId, InstructionBlock};

/// A two-way branch on the last instruction of `condition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfElse {
    pub condition: BlockId,
    /// Branch target, taken when the condition holds
    pub then_block: BlockId,
    /// Fallthrough
    pub else_block: BlockId,
    /// Block both arms continue into, if there is one
    pub merge: Option<BlockId>,
    /// `then_block` heads another if/else
    pub nested_then: Option<BlockId>,
    /// `else_block` heads another if/else
    pub nested_else: Option<BlockId>,
}

impl IfElse {
    /// The target arm falls straight into the fallthrough arm.
    pub fn is_if_then(&self) -> bool {
        self.merge == Some(self.else_block)
    }

    /// The fallthrough arm falls straight into the target arm.
    pub fn is_if_not_then(&self) -> bool {
        self.merge == Some(self.then_block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchCase {
    /// Always zero: jump tables are not decoded.
    pub value: u32,
    pub target: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub header: BlockId,
    pub cases: Vec<SwitchCase>,
}

/// Structure headed by a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    IfElse(IfElse),
    Switch(Switch),
}

/// Recover structures, one slot per block of `function`.
pub fn analyze(function: &AsmFunction) -> Vec<Option<Structure>> {
    let mut structures: Vec<Option<Structure>> = function
        .blocks
        .iter()
        .map(|block| {
            if_else(function, block)
                .map(Structure::IfElse)
                .or_else(|| switch(block).map(Structure::Switch))
        })
        .collect();

    // second pass: link nested if/else heads
    let heads_if: Vec<bool> = structures
        .iter()
        .map(|s| matches!(s, Some(Structure::IfElse(_))))
        .collect();
    for structure in structures.iter_mut().flatten() {
        if let Structure::IfElse(ie) = structure {
            ie.nested_then = heads_if[ie.then_block.0].then_some(ie.then_block);
            ie.nested_else = heads_if[ie.else_block.0].then_some(ie.else_block);
        }
    }

    log::debug!(
        "Structure recovery of 0x{:08X}: {} structures",
        function.entry,
        structures.iter().flatten().count()
    );
    structures
}

/// The single successor of `block`, if it has exactly one.
fn sole_successor(function: &AsmFunction, id: BlockId) -> Option<BlockId> {
    match function.block(id).successors.as_slice() {
        [only] => Some(*only),
        _ => None,
    }
}

fn if_else(function: &AsmFunction, block: &InstructionBlock) -> Option<IfElse> {
    let last = block.last_instruction()?;
    if last.flow() != FlowKind::ConditionalJump {
        return None;
    }
    let [then_block, else_block] = block.successors.as_slice() else {
        return None;
    };
    let (then_block, else_block) = (*then_block, *else_block);

    let then_next = sole_successor(function, then_block);
    let else_next = sole_successor(function, else_block);
    let merge = match (then_next, else_next) {
        (Some(a), Some(b)) if a == b && a != block.id => Some(a),
        (Some(a), _) if a == else_block => Some(else_block),
        (_, Some(b)) if b == then_block => Some(then_block),
        _ => None,
    };

    Some(IfElse {
        condition: block.id,
        then_block,
        else_block,
        merge,
        nested_then: None,
        nested_else: None,
    })
}

/// Indirect jump with more than two successors.
fn switch(block: &InstructionBlock) -> Option<Switch> {
    let last = block.last_instruction()?;
    let indirect = last.mnemonic == Mnemonic::Jmp
        && !matches!(last.operands.first(), Some(Operand::RelativeOffset { .. }));
    if !indirect || block.successors.len() <= 2 {
        return None;
    }
    Some(Switch {
        header: block.id,
        cases: block
            .successors
            .iter()
            .map(|target| SwitchCase {
                value: 0,
                target: *target,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecompilerConfig;
    use crate::decoder::{decode_at, X86Decoder};
    use crate::strategy::recursive;
    use crate::{Address, AnalyzerContext, CodeBuffer};

    fn build(bytes: &[u8]) -> AsmFunction {
        let code = CodeBuffer::new(bytes, 0x1000);
        recursive::build(&code, &X86Decoder::new(), 0x1000, &DecompilerConfig::default()).unwrap()
    }

    fn if_else_at(structures: &[Option<Structure>], id: usize) -> &IfElse {
        match &structures[id] {
            Some(Structure::IfElse(ie)) => ie,
            other => panic!("expected if/else, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_with_merge() {
        let bytes = [
            0x85, 0xC0, // test eax, eax
            0x74, 0x05, // je 0x1009
            0x40, 0x40, 0x40, // inc eax x3
            0xEB, 0x03, // jmp 0x100C
            0x48, // dec eax
            0xEB, 0x00, // jmp 0x100C
            0xC3, // ret
        ];
        let function = build(&bytes);
        let structures = analyze(&function);
        assert_eq!(structures.len(), 4);

        let ie = if_else_at(&structures, 0);
        assert_eq!(ie.then_block, BlockId(2));
        assert_eq!(ie.else_block, BlockId(1));
        assert_eq!(ie.merge, Some(BlockId(3)));
        assert!(ie.nested_then.is_none());
        assert!(structures[1].is_none());
    }

    #[test]
    fn test_if_then_shape() {
        // cmp eax, 1; jne 0x1006; inc eax; ret
        let bytes = [0x83, 0xF8, 0x01, 0x75, 0x01, 0x40, 0xC3];
        let function = build(&bytes);
        let structures = analyze(&function);
        let ie = if_else_at(&structures, 0);
        assert_eq!(function.block(ie.then_block).start, 0x1006);
        assert_eq!(function.block(ie.else_block).start, 0x1005);
        assert!(ie.is_if_not_then());
        assert!(!ie.is_if_then());
    }

    #[test]
    fn test_nested_if() {
        let bytes = [
            0x85, 0xC0, // 1000: test eax, eax
            0x74, 0x06, // 1002: je 0x100A
            0x85, 0xDB, // 1004: test ebx, ebx
            0x75, 0x02, // 1006: jne 0x100A
            0x40, // 1008: inc eax
            0x40, // 1009: inc eax
            0xC3, // 100A: ret
        ];
        let function = build(&bytes);
        let structures = analyze(&function);
        let outer = if_else_at(&structures, 0);
        assert_eq!(function.block(outer.else_block).start, 0x1004);
        assert_eq!(outer.nested_else, Some(outer.else_block));
        assert!(outer.nested_then.is_none());
    }

    #[test]
    fn test_switch_stub() {
        // hand-built: jmp dword ptr [eax*4+0x2000] with three recovered targets
        let mut header = InstructionBlock::new(BlockId(0), 0x1000);
        header
            .instructions
            .push(decode_at(&[0xFF, 0x24, 0x85, 0x00, 0x20, 0x00, 0x00], 0x1000).unwrap());
        header.successors = vec![BlockId(1), BlockId(2), BlockId(3)];

        let mut blocks = vec![header];
        for (i, start) in [0x1007 as Address, 0x1008, 0x1009].iter().enumerate() {
            let mut block = InstructionBlock::new(BlockId(i + 1), *start);
            block.instructions.push(decode_at(&[0xC3], *start).unwrap());
            block.predecessors.push(BlockId(0));
            blocks.push(block);
        }
        let function = AsmFunction {
            entry: 0x1000,
            blocks,
            context: AnalyzerContext::default(),
        };

        let structures = analyze(&function);
        match &structures[0] {
            Some(Structure::Switch(sw)) => {
                assert_eq!(sw.header, BlockId(0));
                assert_eq!(sw.cases.len(), 3);
                assert!(sw.cases.iter().all(|c| c.value == 0));
                assert_eq!(sw.cases[2].target, BlockId(3));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }
}
