//! Operand model for 32-bit x86 instructions.
//!
//! Operands are produced once by the decoder and never mutated afterwards,
//! except for the segment override which the decode loop stamps onto memory
//! operands before the instruction is sealed.

use std::fmt;

/// Access width of an operand in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
    /// 80-bit x87 extended precision / packed BCD.
    Tbyte,
}

impl Width {
    /// Width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
            Width::Dword => 32,
            Width::Qword => 64,
            Width::Tbyte => 80,
        }
    }

    /// Width in bytes.
    pub fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// The `xxx ptr` prefix used for memory operands of this width.
    pub fn ptr_prefix(self) -> &'static str {
        match self {
            Width::Byte => "byte ptr ",
            Width::Word => "word ptr ",
            Width::Dword => "dword ptr ",
            Width::Qword => "qword ptr ",
            Width::Tbyte => "tbyte ptr ",
        }
    }
}

/// General purpose register identity, independent of access width.
///
/// The discriminant is the 3-bit encoding used by ModR/M, SIB and the
/// `+r` opcode forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

const NAMES_8: [&str; 8] = ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"];
const NAMES_16: [&str; 8] = ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"];
const NAMES_32: [&str; 8] = ["eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi"];

impl Register {
    /// All registers in encoding order.
    pub const ALL: [Register; 8] = [
        Register::Eax,
        Register::Ecx,
        Register::Edx,
        Register::Ebx,
        Register::Esp,
        Register::Ebp,
        Register::Esi,
        Register::Edi,
    ];

    /// Map a 3-bit encoding to a register. Only the low three bits are used.
    pub fn from_index(index: u8) -> Register {
        Self::ALL[(index & 7) as usize]
    }

    /// The 3-bit encoding of this register.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Canonical lowercase name at the given width.
    ///
    /// Widths wider than 32 bits fall back to the 32-bit name; there are no
    /// 64-bit general purpose registers in protected mode.
    pub fn name(self, width: Width) -> &'static str {
        let i = self.index() as usize;
        match width {
            Width::Byte => NAMES_8[i],
            Width::Word => NAMES_16[i],
            _ => NAMES_32[i],
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(Width::Dword))
    }
}

/// Segment override selected by a prefix byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Es,
    Cs,
    Ss,
    Ds,
    Fs,
    Gs,
}

impl Segment {
    /// Segment selected by an override prefix byte, if `byte` is one.
    pub fn from_prefix(byte: u8) -> Option<Segment> {
        match byte {
            0x26 => Some(Segment::Es),
            0x2E => Some(Segment::Cs),
            0x36 => Some(Segment::Ss),
            0x3E => Some(Segment::Ds),
            0x64 => Some(Segment::Fs),
            0x65 => Some(Segment::Gs),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Segment::Es => "es",
            Segment::Cs => "cs",
            Segment::Ss => "ss",
            Segment::Ds => "ds",
            Segment::Fs => "fs",
            Segment::Gs => "gs",
        }
    }
}

/// x87 stack register `st(i)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FpuRegister(pub u8);

impl FpuRegister {
    pub const ST0: FpuRegister = FpuRegister(0);
}

impl fmt::Display for FpuRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "st({})", self.0 & 7)
    }
}

/// Effective address shape of a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// `[disp32]`
    Direct(u32),
    /// `[base]`
    Base(Register),
    /// `[base+disp]`
    BaseDisplacement { base: Register, displacement: i32 },
    /// `[base+index*scale+disp]`, base optional.
    ScaledIndex {
        base: Option<Register>,
        index: Register,
        scale: u8,
        displacement: i32,
    },
}

impl Addressing {
    /// Base register of the address, if any.
    pub fn base(&self) -> Option<Register> {
        match *self {
            Addressing::Direct(_) => None,
            Addressing::Base(base) => Some(base),
            Addressing::BaseDisplacement { base, .. } => Some(base),
            Addressing::ScaledIndex { base, .. } => base,
        }
    }

    /// Signed displacement, zero when the form has none.
    pub fn displacement(&self) -> i32 {
        match *self {
            Addressing::Direct(address) => address as i32,
            Addressing::Base(_) => 0,
            Addressing::BaseDisplacement { displacement, .. } => displacement,
            Addressing::ScaledIndex { displacement, .. } => displacement,
        }
    }
}

/// A memory reference.
///
/// `width` is `None` when the operand only names an address (`lea`), which
/// suppresses the `ptr` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Memory {
    pub addressing: Addressing,
    pub width: Option<Width>,
    pub segment: Option<Segment>,
}

impl Memory {
    pub fn new(addressing: Addressing, width: Option<Width>) -> Self {
        Self {
            addressing,
            width,
            segment: None,
        }
    }

    /// Frame-pointer relative offset if this is an `[ebp+disp]` access.
    pub fn frame_offset(&self) -> Option<i32> {
        match self.addressing {
            Addressing::BaseDisplacement {
                base: Register::Ebp,
                displacement,
            } => Some(displacement),
            _ => None,
        }
    }

    /// The bracketed address expression without size or segment prefix.
    pub fn expression(&self) -> String {
        match self.addressing {
            Addressing::Direct(address) => format!("[0x{:08X}]", address),
            Addressing::Base(base) => format!("[{}]", base),
            Addressing::BaseDisplacement { base, displacement } => {
                format!("[{}{}]", base, format_displacement(displacement))
            }
            Addressing::ScaledIndex {
                base,
                index,
                scale,
                displacement,
            } => {
                let mut out = String::from("[");
                if let Some(base) = base {
                    out.push_str(base.name(Width::Dword));
                    out.push('+');
                }
                out.push_str(index.name(Width::Dword));
                if scale > 1 {
                    out.push_str(&format!("*{}", scale));
                }
                if displacement != 0 {
                    out.push_str(&format_displacement(displacement));
                }
                out.push(']');
                out
            }
        }
    }
}

/// `+0x10`, `-0x04`, `+0x12345678`: at least two hex digits.
fn format_displacement(displacement: i32) -> String {
    let sign = if displacement < 0 { '-' } else { '+' };
    let magnitude = displacement.unsigned_abs();
    if magnitude < 256 {
        format!("{}0x{:02X}", sign, magnitude)
    } else {
        format!("{}0x{:X}", sign, magnitude)
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(width) = self.width {
            f.write_str(width.ptr_prefix())?;
        }
        if let Some(segment) = self.segment {
            write!(f, "{}:", segment.name())?;
        }
        f.write_str(&self.expression())
    }
}

/// One instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register {
        register: Register,
        width: Width,
    },
    /// `sign_extended` marks an 8-bit encoding widened to the operand size;
    /// those always render at full width.
    Immediate {
        value: u32,
        width: Width,
        sign_extended: bool,
    },
    Memory(Memory),
    /// Branch target, already resolved to an absolute address.
    RelativeOffset {
        target: u32,
    },
    FpuRegister(FpuRegister),
}

impl Operand {
    pub fn reg(register: Register, width: Width) -> Self {
        Operand::Register { register, width }
    }

    pub fn imm(value: u32, width: Width) -> Self {
        Operand::Immediate {
            value,
            width,
            sign_extended: false,
        }
    }

    /// An imm8 sign-extended to `width`.
    pub fn imm8_extended(byte: u8, width: Width) -> Self {
        let value = byte as i8 as i32 as u32;
        let value = match width {
            Width::Word => value & 0xFFFF,
            _ => value,
        };
        Operand::Immediate {
            value,
            width,
            sign_extended: true,
        }
    }

    /// Operand width, if it has one.
    pub fn width(&self) -> Option<Width> {
        match self {
            Operand::Register { width, .. } => Some(*width),
            Operand::Immediate { width, .. } => Some(*width),
            Operand::Memory(memory) => memory.width,
            Operand::RelativeOffset { .. } => Some(Width::Dword),
            Operand::FpuRegister(_) => Some(Width::Tbyte),
        }
    }

    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Register { register, .. } => Some(*register),
            _ => None,
        }
    }

    pub fn as_immediate(&self) -> Option<u32> {
        match self {
            Operand::Immediate { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_memory(&self) -> Option<&Memory> {
        match self {
            Operand::Memory(memory) => Some(memory),
            _ => None,
        }
    }

    /// True for a full 32-bit register operand naming `register`.
    pub fn is_dword_register(&self, register: Register) -> bool {
        matches!(self, Operand::Register { register: r, width: Width::Dword } if *r == register)
    }

    /// Apply a segment override; a no-op for non-memory operands.
    pub(crate) fn with_segment(self, segment: Segment) -> Self {
        match self {
            Operand::Memory(mut memory) => {
                memory.segment = Some(segment);
                Operand::Memory(memory)
            }
            other => other,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Register { register, width } => f.write_str(register.name(width)),
            Operand::Immediate {
                value,
                width,
                sign_extended,
            } => f.write_str(&format_immediate(value, width, sign_extended)),
            Operand::Memory(memory) => write!(f, "{}", memory),
            Operand::RelativeOffset { target } => write!(f, "0x{:08X}", target),
            Operand::FpuRegister(register) => write!(f, "{}", register),
        }
    }
}

/// Width-dependent immediate rendering.
///
/// 8-bit values always use two digits, 16-bit values below 256 are
/// unpadded and otherwise four digits, 32-bit values render `0x00` for zero,
/// two digits below 256 and eight digits otherwise. Sign-extended imm8
/// encodings always use the full width of their destination.
pub fn format_immediate(value: u32, width: Width, sign_extended: bool) -> String {
    match width {
        Width::Byte => format!("0x{:02X}", value & 0xFF),
        Width::Word => {
            let value = value & 0xFFFF;
            if sign_extended {
                format!("0x{:04X}", value)
            } else if value < 256 {
                format!("0x{:X}", value)
            } else {
                format!("0x{:04X}", value)
            }
        }
        _ => {
            if sign_extended || value >= 256 {
                format!("0x{:08X}", value)
            } else {
                format!("0x{:02X}", value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Register::Eax, Width::Byte, "al")]
    #[case(Register::Esp, Width::Byte, "ah")]
    #[case(Register::Edi, Width::Word, "di")]
    #[case(Register::Ebp, Width::Dword, "ebp")]
    fn test_register_names(#[case] reg: Register, #[case] width: Width, #[case] expected: &str) {
        assert_eq!(reg.name(width), expected);
    }

    #[rstest]
    #[case(0x42, Width::Byte, false, "0x42")]
    #[case(0x05, Width::Byte, false, "0x05")]
    #[case(0x8, Width::Word, false, "0x8")]
    #[case(0x1234, Width::Word, false, "0x1234")]
    #[case(0x100, Width::Word, false, "0x0100")]
    #[case(0, Width::Dword, false, "0x00")]
    #[case(0x42, Width::Dword, false, "0x42")]
    #[case(0x12345678, Width::Dword, false, "0x12345678")]
    #[case(0x1000, Width::Dword, false, "0x00001000")]
    #[case(4, Width::Dword, true, "0x00000004")]
    fn test_immediate_rendering(
        #[case] value: u32,
        #[case] width: Width,
        #[case] extended: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(format_immediate(value, width, extended), expected);
    }

    #[test]
    fn test_sign_extension() {
        let op = Operand::imm8_extended(0xB8, Width::Dword);
        assert_eq!(op.to_string(), "0xFFFFFFB8");
        let op = Operand::imm8_extended(0xFF, Width::Word);
        assert_eq!(op.to_string(), "0xFFFF");
    }

    #[test]
    fn test_memory_rendering() {
        let mem = Memory::new(
            Addressing::BaseDisplacement {
                base: Register::Ebp,
                displacement: -4,
            },
            Some(Width::Dword),
        );
        assert_eq!(mem.to_string(), "dword ptr [ebp-0x04]");
        assert_eq!(mem.frame_offset(), Some(-4));

        let mem = Memory::new(
            Addressing::ScaledIndex {
                base: Some(Register::Eax),
                index: Register::Ecx,
                scale: 4,
                displacement: 0x12345678,
            },
            Some(Width::Dword),
        );
        assert_eq!(mem.to_string(), "dword ptr [eax+ecx*4+0x12345678]");

        let mem = Memory::new(
            Addressing::ScaledIndex {
                base: Some(Register::Ecx),
                index: Register::Edx,
                scale: 1,
                displacement: 0,
            },
            None,
        );
        assert_eq!(mem.to_string(), "[ecx+edx]");
    }

    #[test]
    fn test_segment_override_rendering() {
        let op = Operand::Memory(Memory::new(Addressing::Direct(0), Some(Width::Dword)))
            .with_segment(Segment::Fs);
        assert_eq!(op.to_string(), "dword ptr fs:[0x00000000]");

        // Registers ignore segment overrides.
        let op = Operand::reg(Register::Eax, Width::Dword).with_segment(Segment::Gs);
        assert_eq!(op.to_string(), "eax");
    }
}
