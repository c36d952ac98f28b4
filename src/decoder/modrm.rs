//! ModR/M and SIB decoding for 32-bit addressing.

use crate::operand::{Addressing, Memory, Operand, Register, Width};

use super::Cursor;

/// The three fields of a ModR/M byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            mode: byte >> 6,
            reg: (byte >> 3) & 7,
            rm: byte & 7,
        }
    }

    /// `mod == 11`: the r/m field names a register.
    pub fn is_register(&self) -> bool {
        self.mode == 3
    }

    /// Register selected by the `reg` field.
    pub fn reg_register(&self) -> Register {
        Register::from_index(self.reg)
    }

    /// Register selected by the `r/m` field.
    pub fn rm_register(&self) -> Register {
        Register::from_index(self.rm)
    }
}

/// Decode the memory form of `modrm`, reading SIB and displacement bytes.
///
/// Returns `None` for register forms, truncated input, or when 16-bit
/// addressing is requested.
pub fn decode_memory(
    cursor: &mut Cursor<'_>,
    modrm: ModRm,
    address_size: bool,
) -> Option<Addressing> {
    if modrm.is_register() || address_size {
        return None;
    }

    if modrm.rm == 4 {
        return decode_sib(cursor, modrm.mode);
    }

    match modrm.mode {
        0 if modrm.rm == 5 => Some(Addressing::Direct(cursor.u32()?)),
        0 => Some(Addressing::Base(modrm.rm_register())),
        1 => Some(Addressing::BaseDisplacement {
            base: modrm.rm_register(),
            displacement: cursor.u8()? as i8 as i32,
        }),
        _ => Some(Addressing::BaseDisplacement {
            base: modrm.rm_register(),
            displacement: cursor.u32()? as i32,
        }),
    }
}

fn decode_sib(cursor: &mut Cursor<'_>, mode: u8) -> Option<Addressing> {
    let sib = cursor.u8()?;
    let scale = 1u8 << (sib >> 6);
    let index_bits = (sib >> 3) & 7;
    let base_bits = sib & 7;

    // base 101 with mod 00 means disp32 and no base register
    let (base, displacement) = if base_bits == 5 && mode == 0 {
        (None, cursor.u32()? as i32)
    } else {
        let displacement = match mode {
            0 => 0,
            1 => cursor.u8()? as i8 as i32,
            _ => cursor.u32()? as i32,
        };
        (Some(Register::from_index(base_bits)), displacement)
    };

    // index 100 means no index
    let index = (index_bits != 4).then(|| Register::from_index(index_bits));

    Some(match (base, index) {
        (base, Some(index)) => Addressing::ScaledIndex {
            base,
            index,
            scale,
            displacement,
        },
        (None, None) => Addressing::Direct(displacement as u32),
        (Some(base), None) if mode == 0 => Addressing::Base(base),
        (Some(base), None) => Addressing::BaseDisplacement { base, displacement },
    })
}

/// Decode the r/m operand: a register of `width` or a memory access of `width`.
pub fn decode_rm(
    cursor: &mut Cursor<'_>,
    modrm: ModRm,
    width: Width,
    address_size: bool,
) -> Option<Operand> {
    if modrm.is_register() {
        return Some(Operand::reg(modrm.rm_register(), width));
    }
    let addressing = decode_memory(cursor, modrm, address_size)?;
    Some(Operand::Memory(Memory::new(addressing, Some(width))))
}
