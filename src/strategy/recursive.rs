//! Recursive descent CFG construction.
//!
//! Blocks are discovered from a worklist of start addresses, decoded straight
//! against the virtual addresses of the code buffer. A jump into the middle of
//! an already decoded block splits that block, so each reachable start address
//! ends up heading exactly one block.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::config::DecompilerConfig;
use crate::instruction::{FlowKind, Instruction};
use crate::{
    Address, AnalyzerContext, AsmFunction, BlockId, CodeBuffer, DecompileError, Decoder,
    Disassembly, InstructionBlock,
};

/// Recursive-descent disassembly into a Control Flow Graph (CFG), starting at
/// the first byte of `code`.
pub fn run(code: &CodeBuffer<'_>, decoder: &dyn Decoder) -> Result<Disassembly, DecompileError> {
    if code.is_empty() {
        return Ok(Disassembly::Cfg(Vec::new()));
    }
    run_from(code, decoder, code.base())
}

/// Run recursive disassembly from a specific entry point
pub fn run_from(
    code: &CodeBuffer<'_>,
    decoder: &dyn Decoder,
    entry_point: Address,
) -> Result<Disassembly, DecompileError> {
    let function = build(code, decoder, entry_point, &DecompilerConfig::default())?;
    Ok(Disassembly::Cfg(function.blocks))
}

/// Build the CFG of the function entered at `entry`.
///
/// # Returns
/// An `AsmFunction` with blocks sorted by address and an empty analysis
/// context, or `NoCodeSection` when `entry` is outside `code`
pub fn build(
    code: &CodeBuffer<'_>,
    decoder: &dyn Decoder,
    entry: Address,
    config: &DecompilerConfig,
) -> Result<AsmFunction, DecompileError> {
    if !code.contains(entry) {
        return Err(DecompileError::NoCodeSection(entry));
    }
    log::debug!("Building CFG from 0x{:08X}", entry);

    let mut builder = CfgBuilder {
        code,
        decoder,
        config,
        blocks: BTreeMap::new(),
        owner: HashMap::new(),
    };
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(entry);

    while let Some(start) = queue.pop_front() {
        if !seen.insert(start) || builder.blocks.contains_key(&start) {
            continue;
        }
        if builder.owner.contains_key(&start) {
            builder.split(start);
            continue;
        }
        if !code.contains(start) {
            log::warn!("Branch target 0x{:08X} is outside the code buffer", start);
            continue;
        }
        if builder.blocks.len() >= config.max_blocks {
            log::warn!(
                "Block limit of {} reached at 0x{:08X}; CFG truncated",
                config.max_blocks,
                start
            );
            break;
        }

        for target in builder.decode_block(start)? {
            if !seen.contains(&target) {
                queue.push_back(target);
            }
        }
    }

    let function = builder.finish(entry);
    log::debug!(
        "CFG for 0x{:08X}: {} blocks, {} instructions",
        entry,
        function.blocks.len(),
        function.instructions().count()
    );
    Ok(function)
}

/// A block under construction; edges are still raw addresses.
struct RawBlock {
    instructions: Vec<Instruction>,
    targets: Vec<Address>,
}

struct CfgBuilder<'a, 'b> {
    code: &'a CodeBuffer<'b>,
    decoder: &'a dyn Decoder,
    config: &'a DecompilerConfig,
    blocks: BTreeMap<Address, RawBlock>,
    /// Instruction address -> start of the block holding it.
    owner: HashMap<Address, Address>,
}

impl CfgBuilder<'_, '_> {
    /// Decode one block at `start` and return the addresses it branches to.
    fn decode_block(&mut self, start: Address) -> Result<Vec<Address>, DecompileError> {
        let mut block = RawBlock {
            instructions: Vec::new(),
            targets: Vec::new(),
        };
        let mut discovered = Vec::new();
        let mut at = start;

        loop {
            // ran into code that already belongs to a block
            if at != start && (self.blocks.contains_key(&at) || self.owner.contains_key(&at)) {
                if !self.blocks.contains_key(&at) {
                    self.split(at);
                }
                block.targets.push(at);
                break;
            }
            if !self.code.contains(at) {
                log::warn!("Decoding ran off the end of the code buffer at 0x{:08X}", at);
                break;
            }
            if block.instructions.len() >= self.config.max_block_instructions {
                log::warn!(
                    "Block at 0x{:08X} exceeds {} instructions; split at 0x{:08X}",
                    start,
                    self.config.max_block_instructions,
                    at
                );
                block.targets.push(at);
                discovered.push(at);
                break;
            }

            let insn = self
                .decoder
                .decode(self.code, at)
                .ok_or(DecompileError::DecodeFailed(at))?;
            self.owner.insert(at, start);
            let next = insn.next_address();
            let flow = insn.flow();
            let target = insn.branch_target();
            block.instructions.push(insn);

            match flow {
                FlowKind::Jump => {
                    // indirect jumps leave no successor
                    if let Some(target) = target {
                        block.targets.push(target);
                        discovered.push(target);
                    }
                    break;
                }
                FlowKind::ConditionalJump => {
                    if let Some(target) = target {
                        block.targets.push(target);
                        discovered.push(target);
                    }
                    if !block.targets.contains(&next) {
                        block.targets.push(next);
                        discovered.push(next);
                    }
                    break;
                }
                FlowKind::Return | FlowKind::Halt => break,
                FlowKind::Call | FlowKind::Sequential => at = next,
            }
        }

        log::trace!(
            "Block 0x{:08X}: {} instructions, targets {:X?}",
            start,
            block.instructions.len(),
            block.targets
        );
        self.blocks.insert(start, block);
        Ok(discovered)
    }

    /// Split the block owning `at` so that a new block starts there.
    fn split(&mut self, at: Address) -> bool {
        let Some(&head_start) = self.owner.get(&at) else {
            return false;
        };
        let Some(mut head) = self.blocks.remove(&head_start) else {
            return false;
        };
        let Some(index) = head.instructions.iter().position(|i| i.address == at) else {
            self.blocks.insert(head_start, head);
            return false;
        };

        let tail = RawBlock {
            instructions: head.instructions.split_off(index),
            targets: std::mem::replace(&mut head.targets, vec![at]),
        };
        for insn in &tail.instructions {
            self.owner.insert(insn.address, at);
        }
        log::trace!("Split block 0x{:08X} at 0x{:08X}", head_start, at);
        self.blocks.insert(head_start, head);
        self.blocks.insert(at, tail);
        true
    }

    /// Number the blocks in address order and resolve both edge directions.
    fn finish(self, entry: Address) -> AsmFunction {
        let ids: HashMap<Address, BlockId> = self
            .blocks
            .keys()
            .enumerate()
            .map(|(i, start)| (*start, BlockId(i)))
            .collect();

        let mut blocks: Vec<InstructionBlock> = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, (start, raw))| {
                let mut block = InstructionBlock::new(BlockId(i), start);
                block.instructions = raw.instructions;
                for target in raw.targets {
                    if let Some(&id) = ids.get(&target) {
                        if !block.successors.contains(&id) {
                            block.successors.push(id);
                        }
                    }
                }
                block
            })
            .collect();

        for i in 0..blocks.len() {
            for succ in blocks[i].successors.clone() {
                blocks[succ.0].predecessors.push(BlockId(i));
            }
        }

        AsmFunction {
            entry,
            blocks,
            context: AnalyzerContext::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::X86Decoder;
    use crate::instruction::Mnemonic;
    use rstest::rstest;

    fn cfg(bytes: &[u8]) -> AsmFunction {
        let code = CodeBuffer::new(bytes, 0x1000);
        build(&code, &X86Decoder::new(), 0x1000, &DecompilerConfig::default()).unwrap()
    }

    fn starts(function: &AsmFunction) -> Vec<Address> {
        function.blocks.iter().map(|b| b.start).collect()
    }

    fn assert_well_formed(function: &AsmFunction) {
        for block in &function.blocks {
            assert!(block.successors.len() <= 2);
            for succ in &block.successors {
                assert!(function.block(*succ).predecessors.contains(&block.id));
            }
            for pred in &block.predecessors {
                assert!(function.block(*pred).successors.contains(&block.id));
            }
        }
    }

    #[test]
    fn test_recursive_disassembly_simple() {
        // mov eax, 1; ret
        let function = cfg(&[0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3]);
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.blocks[0].instructions.len(), 2);
        assert_eq!(function.blocks[0].instructions[1].mnemonic, Mnemonic::Ret);
        assert!(function.blocks[0].successors.is_empty());
    }

    #[test]
    fn test_diamond() {
        // 1000: test eax, eax
        // 1002: je 1009
        // 1004: mov eax, 1 ... jmp 100E
        let bytes = [
            0x85, 0xC0, // test eax, eax
            0x74, 0x05, // je 0x1009
            0x40, // inc eax
            0x40, // inc eax
            0x40, // inc eax
            0xEB, 0x05, // jmp 0x100E
            0x48, // dec eax
            0x48, // dec eax
            0xEB, 0x01, // jmp 0x100E
            0x90, // nop (unreached)
            0xC3, // ret
        ];
        let function = cfg(&bytes);
        assert_eq!(starts(&function), vec![0x1000, 0x1004, 0x1009, 0x100E]);
        // target first, fallthrough second
        assert_eq!(function.blocks[0].successors, vec![BlockId(2), BlockId(1)]);
        assert_eq!(function.blocks[1].successors, vec![BlockId(3)]);
        assert_eq!(function.blocks[2].successors, vec![BlockId(3)]);
        assert_eq!(function.blocks[3].predecessors.len(), 2);
        assert_well_formed(&function);
    }

    #[test]
    fn test_self_loop() {
        // dec ecx; jnz 0x1000; ret
        let function = cfg(&[0x49, 0x75, 0xFD, 0xC3]);
        assert_eq!(starts(&function), vec![0x1000, 0x1003]);
        assert_eq!(function.blocks[0].successors, vec![BlockId(0), BlockId(1)]);
        assert!(function.blocks[0].predecessors.contains(&BlockId(0)));
        assert_well_formed(&function);
    }

    #[test]
    fn test_jump_into_block_middle_splits() {
        // 1000: nop; 1001: nop; 1002: dec ecx; 1003: jnz 1001; 1005: ret
        let function = cfg(&[0x90, 0x90, 0x49, 0x75, 0xFC, 0xC3]);
        assert_eq!(starts(&function), vec![0x1000, 0x1001, 0x1005]);
        assert_eq!(function.blocks[0].instructions.len(), 1);
        assert_eq!(function.blocks[0].successors, vec![BlockId(1)]);
        assert_eq!(function.blocks[1].successors, vec![BlockId(1), BlockId(2)]);
        assert_well_formed(&function);
    }

    #[test]
    fn test_fallthrough_into_existing_block() {
        // 1000: je 1003; 1002: nop falls into 1003
        let function = cfg(&[0x74, 0x01, 0x90, 0xC3]);
        assert_eq!(starts(&function), vec![0x1000, 0x1002, 0x1003]);
        assert_eq!(function.blocks[1].instructions.len(), 1);
        assert_eq!(function.blocks[1].successors, vec![BlockId(2)]);
        assert_well_formed(&function);
    }

    #[rstest]
    #[case(&[0x40, 0xCC, 0x90, 0xC3])] // inc eax; int3
    #[case(&[0x40, 0xF4, 0x90, 0xC3])] // inc eax; hlt
    #[case(&[0x40, 0x0F, 0x0B, 0x90, 0xC3])] // inc eax; ud2
    fn test_trap_ends_block(#[case] bytes: &[u8]) {
        let function = cfg(bytes);
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.blocks[0].instructions.len(), 2);
        assert!(function.blocks[0].successors.is_empty());
    }

    #[test]
    fn test_hlt_arm_has_no_successors() {
        // jz 0x1003; hlt; ret
        let function = cfg(&[0x74, 0x01, 0xF4, 0xC3]);
        assert_eq!(starts(&function), vec![0x1000, 0x1002, 0x1003]);
        assert_eq!(function.blocks[0].successors, vec![BlockId(2), BlockId(1)]);
        assert!(function.blocks[1].successors.is_empty());
    }

    #[test]
    fn test_call_does_not_end_block() {
        // call 0x1006; ret; ... ; 1006: ret
        let function = cfg(&[0xE8, 0x01, 0x00, 0x00, 0x00, 0xC3, 0xC3]);
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.blocks[0].instructions.len(), 2);
    }

    #[test]
    fn test_indirect_jump_has_no_successors() {
        // jmp eax
        let function = cfg(&[0xFF, 0xE0, 0xC3]);
        assert_eq!(function.blocks.len(), 1);
        assert!(function.blocks[0].successors.is_empty());
    }

    #[test]
    fn test_out_of_range_target_dropped() {
        // jmp 0x2000
        let function = cfg(&[0xE9, 0xFB, 0x0F, 0x00, 0x00]);
        assert_eq!(function.blocks.len(), 1);
        assert!(function.blocks[0].successors.is_empty());
    }

    #[test]
    fn test_conditional_jump_to_next() {
        // je 0x1002; ret
        let function = cfg(&[0x74, 0x00, 0xC3]);
        assert_eq!(function.blocks[0].successors, vec![BlockId(1)]);
    }

    #[test]
    fn test_block_limit() {
        let code_bytes = [0x74, 0x01, 0x90, 0xC3];
        let code = CodeBuffer::new(&code_bytes, 0x1000);
        let config = DecompilerConfig {
            max_blocks: 1,
            ..DecompilerConfig::default()
        };
        let function = build(&code, &X86Decoder::new(), 0x1000, &config).unwrap();
        assert_eq!(function.blocks.len(), 1);
        assert!(function.blocks[0].successors.is_empty());
    }

    #[test]
    fn test_instruction_limit_splits_block() {
        let code_bytes = [0x90, 0x90, 0x90, 0xC3];
        let code = CodeBuffer::new(&code_bytes, 0x1000);
        let config = DecompilerConfig {
            max_block_instructions: 2,
            ..DecompilerConfig::default()
        };
        let function = build(&code, &X86Decoder::new(), 0x1000, &config).unwrap();
        assert_eq!(starts(&function), vec![0x1000, 0x1002]);
        assert_eq!(function.blocks[0].successors, vec![BlockId(1)]);
    }

    #[test]
    fn test_entry_outside_buffer() {
        let bytes = [0xC3];
        let code = CodeBuffer::new(&bytes, 0x1000);
        let err = build(&code, &X86Decoder::new(), 0x2000, &DecompilerConfig::default());
        assert!(matches!(err, Err(DecompileError::NoCodeSection(0x2000))));
    }

    struct RefusingDecoder;

    impl Decoder for RefusingDecoder {
        fn decode(&self, _code: &CodeBuffer<'_>, _at: Address) -> Option<Instruction> {
            None
        }
    }

    #[test]
    fn test_decoder_contract_violation_is_an_error() {
        let bytes = [0x90];
        let code = CodeBuffer::new(&bytes, 0x1000);
        let err = build(&code, &RefusingDecoder, 0x1000, &DecompilerConfig::default());
        assert!(matches!(err, Err(DecompileError::DecodeFailed(0x1000))));
    }

    #[test]
    fn test_run_returns_cfg() {
        let bytes = [0x49, 0x75, 0xFD, 0xC3];
        let code = CodeBuffer::new(&bytes, 0x1000);
        match run(&code, &X86Decoder::new()).unwrap() {
            Disassembly::Cfg(blocks) => assert_eq!(blocks.len(), 2),
            Disassembly::Stream(_) => panic!("Expected CFG disassembly"),
        }
    }
}
