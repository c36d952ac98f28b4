//! Native 32-bit x86 instruction decoder.
//!
//! Decoding is fail-soft: any byte sequence produces an instruction. Unknown
//! opcodes and encodings whose operands run past the end of the input become
//! a one-byte `db` instruction so that a sweep can always make progress.
//!
//! ```
//! use nuclide_lift::decoder::decode_at;
//!
//! let insn = decode_at(&[0x83, 0xC1, 0x04], 0).unwrap();
//! assert_eq!(insn.assembly(), "add ecx, 0x00000004");
//! ```

pub mod fpu;
pub mod modrm;
pub mod opcode;
pub mod prefix;

use crate::instruction::{Instruction, Mnemonic};
use crate::operand::{Memory, Operand, Register, Width};
use crate::{Address, CodeBuffer, Decoder};

use self::modrm::ModRm;
use self::prefix::{Prefixes, RepPrefix};

/// Architectural limit on the length of one instruction.
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

/// Forward-only reader over the bytes of one instruction.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    pub fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.bytes.len());
    }

    pub fn u8(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    pub fn u16(&mut self) -> Option<u16> {
        let raw = self.bytes.get(self.position..self.position + 2)?;
        self.position += 2;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }

    pub fn u32(&mut self) -> Option<u32> {
        let raw = self.bytes.get(self.position..self.position + 4)?;
        self.position += 4;
        Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// Per-instruction decode state handed to the opcode tables.
pub struct DecodeContext<'a> {
    pub cursor: Cursor<'a>,
    pub prefixes: Prefixes,
    /// Address of the first byte, prefixes included.
    pub address: Address,
}

impl DecodeContext<'_> {
    pub fn operand_width(&self) -> Width {
        self.prefixes.operand_width()
    }

    pub fn modrm(&mut self) -> Option<ModRm> {
        self.cursor.u8().map(ModRm::from_byte)
    }

    /// The r/m operand at `width`.
    pub fn rm(&mut self, modrm: ModRm, width: Width) -> Option<Operand> {
        modrm::decode_rm(&mut self.cursor, modrm, width, self.prefixes.address_size)
    }

    /// A memory-only r/m operand. Register forms are invalid here.
    pub fn memory(&mut self, modrm: ModRm, width: Option<Width>) -> Option<Operand> {
        let addressing =
            modrm::decode_memory(&mut self.cursor, modrm, self.prefixes.address_size)?;
        Some(Operand::Memory(Memory::new(addressing, width)))
    }

    /// Register operand encoded in the `reg` field.
    pub fn reg(&self, modrm: ModRm, width: Width) -> Operand {
        Operand::reg(modrm.reg_register(), width)
    }

    pub fn imm(&mut self, width: Width) -> Option<Operand> {
        let value = match width {
            Width::Byte => self.cursor.u8()? as u32,
            Width::Word => self.cursor.u16()? as u32,
            _ => self.cursor.u32()?,
        };
        Some(Operand::imm(value, width))
    }

    /// An imm8 sign-extended to `width`.
    pub fn imm8_extended(&mut self, width: Width) -> Option<Operand> {
        Some(Operand::imm8_extended(self.cursor.u8()?, width))
    }

    pub fn rel8(&mut self) -> Option<Operand> {
        let offset = self.cursor.u8()? as i8 as i32;
        Some(self.relative(offset))
    }

    pub fn rel32(&mut self) -> Option<Operand> {
        let offset = self.cursor.u32()? as i32;
        Some(self.relative(offset))
    }

    /// Resolve a displacement against the end of the instruction so far.
    fn relative(&self, offset: i32) -> Operand {
        let next = (self.address as u32).wrapping_add(self.cursor.position() as u32);
        Operand::RelativeOffset {
            target: next.wrapping_add(offset as u32),
        }
    }
}

/// Decode one instruction from the start of `bytes`, located at `address`.
///
/// Returns `None` only for empty input.
pub fn decode_at(bytes: &[u8], address: Address) -> Option<Instruction> {
    let first = *bytes.first()?;
    let mut cursor = Cursor::new(bytes);
    let prefixes = Prefixes::read(&mut cursor);

    if cursor.peek().is_none() {
        let consumed = cursor.position();
        let last = prefixes.last.unwrap_or(first);
        return Some(Instruction::new(
            address,
            Mnemonic::Prefix(last),
            Vec::new(),
            &bytes[..consumed],
        ));
    }

    let mut ctx = DecodeContext {
        cursor,
        prefixes,
        address,
    };
    let decoded = ctx
        .cursor
        .u8()
        .and_then(|byte| opcode::decode(&mut ctx, byte));
    let length = ctx.cursor.position();

    let (mnemonic, operands) = match decoded {
        Some(decoded) if length <= MAX_INSTRUCTION_LENGTH => decoded,
        _ => return Some(Instruction::unknown(address, first)),
    };

    let prefixes = ctx.prefixes;
    let mnemonic = match prefixes.rep {
        Some(rep) if mnemonic.is_string_op() => mnemonic.with_rep(rep == RepPrefix::Repne),
        _ => mnemonic,
    };
    let operands = match prefixes.segment {
        Some(segment) => operands
            .into_iter()
            .map(|operand| operand.with_segment(segment))
            .collect(),
        None => operands,
    };

    let mut insn = Instruction::new(address, mnemonic, operands, &bytes[..length]);
    insn.lock = prefixes.lock;
    Some(insn)
}

/// Decode every instruction in `bytes`, back to back.
pub fn decode_all(bytes: &[u8], base: Address) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while let Some(insn) = decode_at(&bytes[offset..], base + offset as Address) {
        offset += insn.length as usize;
        out.push(insn);
    }
    out
}

/// The crate's built-in decoder for 32-bit protected-mode code.
#[derive(Debug, Default, Clone, Copy)]
pub struct X86Decoder;

impl X86Decoder {
    pub fn new() -> Self {
        X86Decoder
    }
}

impl Decoder for X86Decoder {
    fn decode(&self, code: &CodeBuffer<'_>, at: Address) -> Option<Instruction> {
        decode_at(code.slice_from(at)?, at)
    }
}

/// Shorthand for a full-width register operand.
pub(crate) fn gpr(index: u8, width: Width) -> Operand {
    Operand::reg(Register::from_index(index), width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn one(bytes: &[u8]) -> Instruction {
        decode_at(bytes, 0).unwrap()
    }

    #[rstest]
    #[case(&[0xC3], "ret", "")]
    #[case(&[0xB8, 0x78, 0x56, 0x34, 0x12], "mov", "eax, 0x12345678")]
    #[case(&[0x83, 0xC1, 0x04], "add", "ecx, 0x00000004")]
    #[case(&[0xEB, 0x05], "jmp", "0x00000007")]
    fn test_concrete_scenarios(#[case] bytes: &[u8], #[case] mnemonic: &str, #[case] operands: &str) {
        let insn = one(bytes);
        assert_eq!(insn.mnemonic_text(), mnemonic);
        assert_eq!(insn.operands_text(), operands);
        assert_eq!(insn.length as usize, bytes.len());
    }

    #[test]
    fn test_sequence_with_sign_extension() {
        let bytes = [0x7D, 0x05, 0x83, 0xC5, 0x18, 0xEB, 0x03, 0x83, 0xC5, 0xB8];
        let text: Vec<String> = decode_all(&bytes, 0).iter().map(|i| i.assembly()).collect();
        assert_eq!(
            text,
            vec![
                "jge 0x00000007",
                "add ebp, 0x00000018",
                "jmp 0x0000000A",
                "add ebp, 0xFFFFFFB8",
            ]
        );
    }

    #[test]
    fn test_relative_target_wraps() {
        let insn = decode_at(&[0x7D, 0xFB], 0xFFFF_FFFE).unwrap();
        assert_eq!(insn.operands_text(), "0xFFFFFFFB");
        let insn = one(&[0xE9, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(insn.operands_text(), "0x1234567D");
    }

    #[test]
    fn test_unknown_consumes_one_byte() {
        let insn = one(&[0x0F, 0xFF]);
        assert_eq!(insn.mnemonic, Mnemonic::Unknown);
        assert_eq!(insn.length, 1);
    }

    #[test]
    fn test_truncated_immediate_is_unknown() {
        let insn = one(&[0xB8, 0x78, 0x56]);
        assert_eq!(insn.mnemonic, Mnemonic::Unknown);
        assert_eq!(insn.length, 1);
        assert_eq!(insn.assembly(), "db 0xB8");
    }

    #[test]
    fn test_prefix_only() {
        let insn = one(&[0x64]);
        assert_eq!(insn.mnemonic_text(), "fs");
        assert!(insn.operands.is_empty());
        assert_eq!(insn.length, 1);
    }

    #[rstest]
    #[case(&[0x64, 0xA4], "movs", "byte ptr fs:[edi], byte ptr fs:[esi]")]
    #[case(&[0xF3, 0xA5], "rep movs", "dword ptr [edi], dword ptr [esi]")]
    #[case(&[0xF2, 0xAE], "repne scas", "al, byte ptr [edi]")]
    #[case(&[0xF3, 0xA6], "repe cmps", "byte ptr [esi], byte ptr [edi]")]
    #[case(&[0x26, 0xAD], "lods", "eax, dword ptr es:[esi]")]
    #[case(&[0x2E, 0x8B, 0x05, 0x00, 0x00, 0x00, 0x00], "mov", "eax, dword ptr cs:[0x00000000]")]
    #[case(&[0x64, 0x89, 0x25, 0x00, 0x00, 0x00, 0x00], "mov", "dword ptr fs:[0x00000000], esp")]
    #[case(&[0xF0, 0x0F, 0xB1, 0x0A], "lock cmpxchg", "dword ptr [edx], ecx")]
    fn test_prefixed_instructions(
        #[case] bytes: &[u8],
        #[case] mnemonic: &str,
        #[case] operands: &str,
    ) {
        let insn = one(bytes);
        assert_eq!(insn.mnemonic_text(), mnemonic);
        assert_eq!(insn.operands_text(), operands);
    }

    #[test]
    fn test_progress_and_determinism() {
        let bytes: Vec<u8> = (0u8..=255).chain((0u8..=255).rev()).collect();
        let first = decode_all(&bytes, 0x1000);
        let second = decode_all(&bytes, 0x1000);
        assert_eq!(first, second);

        let mut expected = 0x1000;
        for insn in &first {
            assert_eq!(insn.address, expected);
            assert!(insn.length >= 1);
            expected += insn.length as Address;
        }
        assert_eq!(expected, 0x1000 + bytes.len() as Address);
    }

    #[test]
    fn test_decoder_trait_respects_bounds() {
        let bytes = [0x90, 0xC3];
        let code = CodeBuffer::new(&bytes, 0x400000);
        let decoder = X86Decoder::new();
        assert_eq!(decoder.decode(&code, 0x400001).unwrap().mnemonic, Mnemonic::Ret);
        assert!(decoder.decode(&code, 0x400002).is_none());
        assert!(decoder.decode(&code, 0x3FFFFF).is_none());
    }
}
