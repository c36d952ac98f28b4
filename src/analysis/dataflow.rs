//! Block-local register value tracking.
//!
//! Every block starts with an empty table; nothing flows across block
//! boundaries. After each instruction the table is snapshotted under that
//! instruction's address.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::instruction::{Instruction, Mnemonic};
use crate::operand::{Memory, Operand, Register, Width};
use crate::{Address, AsmFunction};

/// What is known about a register's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Constant(u32),
    /// Copy of another register whose value was not known.
    Register(Register),
    /// Loaded from memory.
    Memory(Memory),
    Unknown,
}

/// A tracked value and the instruction that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueInfo {
    pub kind: ValueKind,
    pub defined_at: Address,
}

impl ValueInfo {
    pub fn new(kind: ValueKind, defined_at: Address) -> Self {
        Self { kind, defined_at }
    }

    pub fn constant(&self) -> Option<u32> {
        match self.kind {
            ValueKind::Constant(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for ValueInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValueKind::Constant(value) => write!(f, "0x{:08X}", value),
            ValueKind::Register(register) => write!(f, "{}", register),
            ValueKind::Memory(memory) => write!(f, "{}", memory.expression()),
            ValueKind::Unknown => f.write_str("unknown"),
        }
    }
}

/// Register table at one program point. Registers never written in the
/// current block are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot(BTreeMap<Register, ValueInfo>);

impl RegisterSnapshot {
    pub fn get(&self, register: Register) -> Option<&ValueInfo> {
        self.0.get(&register)
    }

    pub fn contains(&self, register: Register) -> bool {
        self.0.contains_key(&register)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, &ValueInfo)> {
        self.0.iter().map(|(r, v)| (*r, v))
    }

    fn set(&mut self, register: Register, kind: ValueKind, at: Address) {
        self.0.insert(register, ValueInfo::new(kind, at));
    }

    fn clobber(&mut self, registers: &[Register], at: Address) {
        for register in registers {
            self.set(*register, ValueKind::Unknown, at);
        }
    }
}

/// Compute register snapshots for every instruction of `function`.
pub fn analyze(function: &AsmFunction) -> HashMap<Address, RegisterSnapshot> {
    let mut snapshots = HashMap::new();

    for block in &function.blocks {
        let mut table = RegisterSnapshot::default();
        for insn in &block.instructions {
            transfer(insn, &mut table);
            snapshots.insert(insn.address, table.clone());
        }
    }

    log::debug!(
        "Data flow of 0x{:08X}: {} snapshots",
        function.entry,
        snapshots.len()
    );
    snapshots
}

/// Full-width register destination, if any.
fn dword_register(operand: Option<&Operand>) -> Option<Register> {
    match operand {
        Some(Operand::Register {
            register,
            width: Width::Dword,
        }) => Some(*register),
        _ => None,
    }
}

/// Apply the effect of one instruction to the table.
fn transfer(insn: &Instruction, table: &mut RegisterSnapshot) {
    use Register::*;

    let at = insn.address;
    let dest = insn.operands.first();
    let src = insn.operands.get(1);

    match insn.mnemonic {
        Mnemonic::Mov => {
            let Some(register) = dest.and_then(|d| d.as_register()) else {
                return;
            };
            let Some(register_d) = dword_register(dest) else {
                // partial writes leave the full register unknown
                table.set(register, ValueKind::Unknown, at);
                return;
            };
            let kind = match src {
                Some(Operand::Immediate { value, .. }) => ValueKind::Constant(*value),
                Some(Operand::Register { register, .. }) => match table.get(*register) {
                    Some(info) => info.kind,
                    None => ValueKind::Register(*register),
                },
                Some(Operand::Memory(memory)) => ValueKind::Memory(*memory),
                _ => ValueKind::Unknown,
            };
            table.set(register_d, kind, at);
        }
        Mnemonic::Xor => {
            let Some(register) = dest.and_then(|d| d.as_register()) else {
                return;
            };
            let zeroing = dword_register(dest).is_some() && dest == src;
            let kind = if zeroing {
                ValueKind::Constant(0)
            } else {
                ValueKind::Unknown
            };
            table.set(register, kind, at);
        }
        Mnemonic::Add | Mnemonic::Sub | Mnemonic::Inc | Mnemonic::Dec => {
            let Some(register) = dest.and_then(|d| d.as_register()) else {
                return;
            };
            let delta = match insn.mnemonic {
                Mnemonic::Inc | Mnemonic::Dec => Some(1),
                _ => src.and_then(|s| s.as_immediate()),
            };
            let current = dword_register(dest)
                .and_then(|r| table.get(r))
                .and_then(|info| info.constant());
            let kind = match (current, delta) {
                (Some(value), Some(delta)) => ValueKind::Constant(match insn.mnemonic {
                    Mnemonic::Add | Mnemonic::Inc => value.wrapping_add(delta),
                    _ => value.wrapping_sub(delta),
                }),
                _ => ValueKind::Unknown,
            };
            table.set(register, kind, at);
        }
        Mnemonic::Xchg => {
            let a = dword_register(dest);
            let b = dword_register(src);
            if let (Some(a), Some(b)) = (a, b) {
                let first = table.get(a).map(|i| i.kind).unwrap_or(ValueKind::Register(a));
                let second = table.get(b).map(|i| i.kind).unwrap_or(ValueKind::Register(b));
                table.set(a, second, at);
                table.set(b, first, at);
            } else {
                let touched = [dest, src].into_iter().flatten().filter_map(|o| o.as_register());
                for register in touched {
                    table.set(register, ValueKind::Unknown, at);
                }
            }
        }
        Mnemonic::Call => table.clobber(&[Eax, Ecx, Edx], at),
        Mnemonic::Popad => table.clobber(&Register::ALL, at),
        Mnemonic::Leave => table.clobber(&[Esp, Ebp], at),
        Mnemonic::Cdq => table.clobber(&[Edx], at),
        Mnemonic::Cwde | Mnemonic::Cbw | Mnemonic::Lahf => table.clobber(&[Eax], at),
        Mnemonic::Cpuid => table.clobber(&[Eax, Ebx, Ecx, Edx], at),
        Mnemonic::Rdtsc => table.clobber(&[Eax, Edx], at),
        Mnemonic::Mul | Mnemonic::Div | Mnemonic::Idiv => table.clobber(&[Eax, Edx], at),
        Mnemonic::Imul if insn.operands.len() == 1 => table.clobber(&[Eax, Edx], at),
        Mnemonic::Lods | Mnemonic::RepLods => table.clobber(&[Eax, Esi, Ecx], at),
        mnemonic if mnemonic.is_string_op() => table.clobber(&[Esi, Edi, Ecx], at),
        Mnemonic::Loop | Mnemonic::Loope | Mnemonic::Loopne => table.clobber(&[Ecx], at),
        mnemonic if mnemonic.writes_destination() => {
            if let Some(register) = dest.and_then(|d| d.as_register()) {
                table.set(register, ValueKind::Unknown, at);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecompilerConfig;
    use crate::decoder::X86Decoder;
    use crate::operand::Addressing;
    use crate::strategy::recursive;
    use crate::CodeBuffer;

    fn snapshots(bytes: &[u8]) -> (AsmFunction, HashMap<Address, RegisterSnapshot>) {
        let code = CodeBuffer::new(bytes, 0x1000);
        let function =
            recursive::build(&code, &X86Decoder::new(), 0x1000, &DecompilerConfig::default())
                .unwrap();
        let snaps = analyze(&function);
        (function, snaps)
    }

    #[test]
    fn test_constants_fold() {
        // mov eax, 5; add eax, 3; sub eax, 1; inc eax; ret
        let bytes = [
            0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0x83, 0xE8, 0x01, 0x40, 0xC3,
        ];
        let (_, snaps) = snapshots(&bytes);
        assert_eq!(snaps[&0x1000].get(Register::Eax).unwrap().constant(), Some(5));
        assert_eq!(snaps[&0x1005].get(Register::Eax).unwrap().constant(), Some(8));
        assert_eq!(snaps[&0x1008].get(Register::Eax).unwrap().constant(), Some(7));

        let last = snaps[&0x100B].get(Register::Eax).unwrap();
        assert_eq!(last.constant(), Some(8));
        assert_eq!(last.defined_at, 0x100B);
        assert!(snaps[&0x100C].contains(Register::Eax));
    }

    #[test]
    fn test_self_xor_and_register_copy() {
        // xor ecx, ecx; mov edx, ecx; mov ebx, esi; ret
        let bytes = [0x31, 0xC9, 0x89, 0xCA, 0x89, 0xF3, 0xC3];
        let (_, snaps) = snapshots(&bytes);
        let snap = &snaps[&0x1006];
        assert_eq!(snap.get(Register::Ecx).unwrap().constant(), Some(0));
        assert_eq!(snap.get(Register::Edx).unwrap().kind, ValueKind::Constant(0));
        assert_eq!(snap.get(Register::Edx).unwrap().defined_at, 0x1002);
        assert_eq!(
            snap.get(Register::Ebx).unwrap().kind,
            ValueKind::Register(Register::Esi)
        );
        assert!(!snap.contains(Register::Esi));
    }

    #[test]
    fn test_memory_load_and_unknowns() {
        // mov eax, [ebp+8]; add eax, ecx; pop esi; ret
        let bytes = [0x8B, 0x45, 0x08, 0x01, 0xC8, 0x5E, 0xC3];
        let (_, snaps) = snapshots(&bytes);
        match snaps[&0x1000].get(Register::Eax).unwrap().kind {
            ValueKind::Memory(memory) => assert_eq!(
                memory.addressing,
                Addressing::BaseDisplacement {
                    base: Register::Ebp,
                    displacement: 8
                }
            ),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(snaps[&0x1003].get(Register::Eax).unwrap().kind, ValueKind::Unknown);
        assert_eq!(snaps[&0x1005].get(Register::Esi).unwrap().kind, ValueKind::Unknown);
    }

    #[test]
    fn test_call_clobbers_scratch_registers() {
        // mov eax, 1; mov ebx, 2; call 0x100F; ret
        let bytes = [
            0xB8, 0x01, 0x00, 0x00, 0x00, 0xBB, 0x02, 0x00, 0x00, 0x00, 0xE8, 0x00, 0x00, 0x00,
            0x00, 0xC3,
        ];
        let (_, snaps) = snapshots(&bytes);
        let snap = &snaps[&0x100A];
        assert_eq!(snap.get(Register::Eax).unwrap().kind, ValueKind::Unknown);
        assert_eq!(snap.get(Register::Ecx).unwrap().kind, ValueKind::Unknown);
        assert_eq!(snap.get(Register::Edx).unwrap().kind, ValueKind::Unknown);
        assert_eq!(snap.get(Register::Ebx).unwrap().constant(), Some(2));
    }

    #[test]
    fn test_no_flow_across_blocks() {
        // mov eax, 7; je 0x1009; nop; nop; ret
        let bytes = [0xB8, 0x07, 0x00, 0x00, 0x00, 0x74, 0x02, 0x90, 0x90, 0xC3];
        let (function, snaps) = snapshots(&bytes);
        assert!(function.blocks.len() > 1);
        assert!(snaps[&0x1005].contains(Register::Eax));
        assert!(!snaps[&0x1007].contains(Register::Eax));
        assert!(!snaps[&0x1009].contains(Register::Eax));
    }

    #[test]
    fn test_value_display() {
        let info = ValueInfo::new(ValueKind::Constant(0x10), 0);
        assert_eq!(info.to_string(), "0x00000010");
        let info = ValueInfo::new(ValueKind::Register(Register::Esi), 0);
        assert_eq!(info.to_string(), "esi");
    }
}
