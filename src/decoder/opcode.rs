//! One- and two-byte opcode tables.
//!
//! Every opcode byte is claimed by exactly one match arm. Group opcodes
//! (`80`-`83`, `C0`/`C1`, `D0`-`D3`, `F6`/`F7`, `FE`/`FF`, `0F BA`) select
//! their operation from the ModR/M `reg` field inside their arm.

use crate::instruction::{Condition, Mnemonic};
use crate::operand::{Addressing, Memory, Operand, Register, Width};

use super::{fpu, gpr, DecodeContext};

/// Operation kind and operands produced by an opcode handler.
pub type Decoded = (Mnemonic, Vec<Operand>);

/// Group 1 and the `00`-`3D` arithmetic block, indexed by `reg` / `opcode >> 3`.
const ALU: [Mnemonic; 8] = [
    Mnemonic::Add,
    Mnemonic::Or,
    Mnemonic::Adc,
    Mnemonic::Sbb,
    Mnemonic::And,
    Mnemonic::Sub,
    Mnemonic::Xor,
    Mnemonic::Cmp,
];

/// Group 2. `/6` is the undocumented `sal` alias of `shl`.
const SHIFTS: [Mnemonic; 8] = [
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Rcl,
    Mnemonic::Rcr,
    Mnemonic::Shl,
    Mnemonic::Shr,
    Mnemonic::Shl,
    Mnemonic::Sar,
];

/// Byte or `v`-sized width selected by the low opcode bit.
fn width_bit(ctx: &DecodeContext<'_>, opcode: u8) -> Width {
    if opcode & 1 == 0 {
        Width::Byte
    } else {
        ctx.operand_width()
    }
}

/// Decode the operation following the prefixes. `None` means the encoding is
/// unsupported or truncated.
pub fn decode(ctx: &mut DecodeContext<'_>, opcode: u8) -> Option<Decoded> {
    let w = ctx.operand_width();
    let decoded = match opcode {
        0x0F => return decode_two_byte(ctx),

        0x00..=0x3F if opcode & 7 < 6 => {
            let mnemonic = ALU[(opcode >> 3) as usize];
            let width = width_bit(ctx, opcode);
            match opcode & 7 {
                0 | 1 => {
                    let m = ctx.modrm()?;
                    (mnemonic, vec![ctx.rm(m, width)?, ctx.reg(m, width)])
                }
                2 | 3 => {
                    let m = ctx.modrm()?;
                    (mnemonic, vec![ctx.reg(m, width), ctx.rm(m, width)?])
                }
                _ => (
                    mnemonic,
                    vec![Operand::reg(Register::Eax, width), ctx.imm(width)?],
                ),
            }
        }

        0x40..=0x47 => (Mnemonic::Inc, vec![gpr(opcode, w)]),
        0x48..=0x4F => (Mnemonic::Dec, vec![gpr(opcode, w)]),
        0x50..=0x57 => (Mnemonic::Push, vec![gpr(opcode, w)]),
        0x58..=0x5F => (Mnemonic::Pop, vec![gpr(opcode, w)]),
        0x60 => (Mnemonic::Pushad, Vec::new()),
        0x61 => (Mnemonic::Popad, Vec::new()),
        0x68 => (Mnemonic::Push, vec![ctx.imm(w)?]),
        0x69 => {
            let m = ctx.modrm()?;
            (Mnemonic::Imul, vec![ctx.reg(m, w), ctx.rm(m, w)?, ctx.imm(w)?])
        }
        0x6A => (Mnemonic::Push, vec![ctx.imm(Width::Byte)?]),
        0x6B => {
            let m = ctx.modrm()?;
            (
                Mnemonic::Imul,
                vec![ctx.reg(m, w), ctx.rm(m, w)?, ctx.imm8_extended(w)?],
            )
        }
        0x70..=0x7F => (Mnemonic::Jcc(Condition::from_code(opcode)), vec![ctx.rel8()?]),

        0x80 | 0x82 => {
            let m = ctx.modrm()?;
            (
                ALU[m.reg as usize],
                vec![ctx.rm(m, Width::Byte)?, ctx.imm(Width::Byte)?],
            )
        }
        0x81 => {
            let m = ctx.modrm()?;
            (ALU[m.reg as usize], vec![ctx.rm(m, w)?, ctx.imm(w)?])
        }
        0x83 => {
            let m = ctx.modrm()?;
            (ALU[m.reg as usize], vec![ctx.rm(m, w)?, ctx.imm8_extended(w)?])
        }
        0x84..=0x87 => {
            let mnemonic = if opcode < 0x86 {
                Mnemonic::Test
            } else {
                Mnemonic::Xchg
            };
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            (mnemonic, vec![ctx.rm(m, width)?, ctx.reg(m, width)])
        }
        0x88..=0x8B => {
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            if opcode & 2 == 0 {
                (Mnemonic::Mov, vec![ctx.rm(m, width)?, ctx.reg(m, width)])
            } else {
                (Mnemonic::Mov, vec![ctx.reg(m, width), ctx.rm(m, width)?])
            }
        }
        0x8D => {
            let m = ctx.modrm()?;
            (Mnemonic::Lea, vec![ctx.reg(m, w), ctx.memory(m, None)?])
        }
        0x8F => {
            let m = ctx.modrm()?;
            if m.reg != 0 {
                return None;
            }
            (Mnemonic::Pop, vec![ctx.rm(m, w)?])
        }

        0x90 => (Mnemonic::Nop, Vec::new()),
        0x91..=0x97 => (
            Mnemonic::Xchg,
            vec![Operand::reg(Register::Eax, w), gpr(opcode, w)],
        ),
        0x98 if ctx.prefixes.operand_size => (Mnemonic::Cbw, Vec::new()),
        0x98 => (Mnemonic::Cwde, Vec::new()),
        0x99 if ctx.prefixes.operand_size => (Mnemonic::Cwd, Vec::new()),
        0x99 => (Mnemonic::Cdq, Vec::new()),
        0x9B => (Mnemonic::Wait, Vec::new()),
        0x9C => (Mnemonic::Pushfd, Vec::new()),
        0x9D => (Mnemonic::Popfd, Vec::new()),
        0x9E => (Mnemonic::Sahf, Vec::new()),
        0x9F => (Mnemonic::Lahf, Vec::new()),

        0xA0..=0xA3 => {
            if ctx.prefixes.address_size {
                return None;
            }
            let width = width_bit(ctx, opcode);
            let offset = Operand::Memory(Memory::new(Addressing::Direct(ctx.cursor.u32()?), None));
            let accumulator = Operand::reg(Register::Eax, width);
            if opcode & 2 == 0 {
                (Mnemonic::Mov, vec![accumulator, offset])
            } else {
                (Mnemonic::Mov, vec![offset, accumulator])
            }
        }
        0xA4..=0xA7 | 0xAA..=0xAF => string_op(ctx, opcode),
        0xA8 => (
            Mnemonic::Test,
            vec![Operand::reg(Register::Eax, Width::Byte), ctx.imm(Width::Byte)?],
        ),
        0xA9 => (
            Mnemonic::Test,
            vec![Operand::reg(Register::Eax, w), ctx.imm(w)?],
        ),
        0xB0..=0xB7 => (
            Mnemonic::Mov,
            vec![gpr(opcode, Width::Byte), ctx.imm(Width::Byte)?],
        ),
        0xB8..=0xBF => (Mnemonic::Mov, vec![gpr(opcode, w), ctx.imm(w)?]),

        0xC0 | 0xC1 => {
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            (
                SHIFTS[m.reg as usize],
                vec![ctx.rm(m, width)?, ctx.imm(Width::Byte)?],
            )
        }
        0xC2 => (Mnemonic::Ret, vec![ctx.imm(Width::Word)?]),
        0xC3 => (Mnemonic::Ret, Vec::new()),
        0xC6 | 0xC7 => {
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            if m.reg != 0 {
                return None;
            }
            (Mnemonic::Mov, vec![ctx.rm(m, width)?, ctx.imm(width)?])
        }
        0xC8 => (
            Mnemonic::Enter,
            vec![ctx.imm(Width::Word)?, ctx.imm(Width::Byte)?],
        ),
        0xC9 => (Mnemonic::Leave, Vec::new()),
        0xCA => (Mnemonic::Retf, vec![ctx.imm(Width::Word)?]),
        0xCB => (Mnemonic::Retf, Vec::new()),
        0xCC => (Mnemonic::Int3, Vec::new()),
        0xCD => (Mnemonic::Int, vec![ctx.imm(Width::Byte)?]),
        0xCE => (Mnemonic::Into, Vec::new()),
        0xCF => (Mnemonic::Iret, Vec::new()),

        0xD0..=0xD3 => {
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            let count = if opcode < 0xD2 {
                Operand::imm(1, Width::Byte)
            } else {
                Operand::reg(Register::Ecx, Width::Byte)
            };
            (SHIFTS[m.reg as usize], vec![ctx.rm(m, width)?, count])
        }
        0xD8..=0xDF => return fpu::decode(ctx, opcode),

        0xE0 => (Mnemonic::Loopne, vec![ctx.rel8()?]),
        0xE1 => (Mnemonic::Loope, vec![ctx.rel8()?]),
        0xE2 => (Mnemonic::Loop, vec![ctx.rel8()?]),
        0xE3 => (Mnemonic::Jecxz, vec![ctx.rel8()?]),
        0xE4 | 0xE5 => {
            let width = width_bit(ctx, opcode);
            (
                Mnemonic::In,
                vec![Operand::reg(Register::Eax, width), ctx.imm(Width::Byte)?],
            )
        }
        0xE6 | 0xE7 => {
            let width = width_bit(ctx, opcode);
            (
                Mnemonic::Out,
                vec![ctx.imm(Width::Byte)?, Operand::reg(Register::Eax, width)],
            )
        }
        0xE8 => (Mnemonic::Call, vec![ctx.rel32()?]),
        0xE9 => (Mnemonic::Jmp, vec![ctx.rel32()?]),
        0xEB => (Mnemonic::Jmp, vec![ctx.rel8()?]),
        0xEC | 0xED => {
            let width = width_bit(ctx, opcode);
            (
                Mnemonic::In,
                vec![
                    Operand::reg(Register::Eax, width),
                    Operand::reg(Register::Edx, Width::Word),
                ],
            )
        }
        0xEE | 0xEF => {
            let width = width_bit(ctx, opcode);
            (
                Mnemonic::Out,
                vec![
                    Operand::reg(Register::Edx, Width::Word),
                    Operand::reg(Register::Eax, width),
                ],
            )
        }
        0xF4 => (Mnemonic::Hlt, Vec::new()),
        0xF5 => (Mnemonic::Cmc, Vec::new()),
        0xF6 | 0xF7 => {
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            let target = ctx.rm(m, width)?;
            match m.reg {
                0 | 1 => (Mnemonic::Test, vec![target, ctx.imm(width)?]),
                2 => (Mnemonic::Not, vec![target]),
                3 => (Mnemonic::Neg, vec![target]),
                4 => (Mnemonic::Mul, vec![target]),
                5 => (Mnemonic::Imul, vec![target]),
                6 => (Mnemonic::Div, vec![target]),
                _ => (Mnemonic::Idiv, vec![target]),
            }
        }
        0xF8 => (Mnemonic::Clc, Vec::new()),
        0xF9 => (Mnemonic::Stc, Vec::new()),
        0xFA => (Mnemonic::Cli, Vec::new()),
        0xFB => (Mnemonic::Sti, Vec::new()),
        0xFC => (Mnemonic::Cld, Vec::new()),
        0xFD => (Mnemonic::Std, Vec::new()),
        0xFE => {
            let m = ctx.modrm()?;
            let mnemonic = match m.reg {
                0 => Mnemonic::Inc,
                1 => Mnemonic::Dec,
                _ => return None,
            };
            (mnemonic, vec![ctx.rm(m, Width::Byte)?])
        }
        0xFF => {
            let m = ctx.modrm()?;
            let mnemonic = match m.reg {
                0 => Mnemonic::Inc,
                1 => Mnemonic::Dec,
                2 => Mnemonic::Call,
                4 => Mnemonic::Jmp,
                6 => Mnemonic::Push,
                _ => return None,
            };
            // near indirect branches always take a 32-bit target
            let width = match mnemonic {
                Mnemonic::Call | Mnemonic::Jmp => Width::Dword,
                _ => w,
            };
            (mnemonic, vec![ctx.rm(m, width)?])
        }

        _ => return None,
    };
    Some(decoded)
}

/// `movs`, `cmps`, `stos`, `lods` and `scas` with their implicit operands.
fn string_op(ctx: &DecodeContext<'_>, opcode: u8) -> Decoded {
    let width = width_bit(ctx, opcode);
    let at = |register| Operand::Memory(Memory::new(Addressing::Base(register), Some(width)));
    let accumulator = Operand::reg(Register::Eax, width);
    match opcode & !1 {
        0xA4 => (Mnemonic::Movs, vec![at(Register::Edi), at(Register::Esi)]),
        0xA6 => (Mnemonic::Cmps, vec![at(Register::Esi), at(Register::Edi)]),
        0xAA => (Mnemonic::Stos, vec![at(Register::Edi), accumulator]),
        0xAC => (Mnemonic::Lods, vec![accumulator, at(Register::Esi)]),
        _ => (Mnemonic::Scas, vec![accumulator, at(Register::Edi)]),
    }
}

fn decode_two_byte(ctx: &mut DecodeContext<'_>) -> Option<Decoded> {
    let opcode = ctx.cursor.u8()?;
    let w = ctx.operand_width();
    let decoded = match opcode {
        0x0B => (Mnemonic::Ud2, Vec::new()),
        0x1F => {
            let m = ctx.modrm()?;
            (Mnemonic::Nop, vec![ctx.rm(m, w)?])
        }
        0x31 => (Mnemonic::Rdtsc, Vec::new()),
        0xA2 => (Mnemonic::Cpuid, Vec::new()),
        0x40..=0x4F => {
            let m = ctx.modrm()?;
            (
                Mnemonic::Cmov(Condition::from_code(opcode)),
                vec![ctx.reg(m, w), ctx.rm(m, w)?],
            )
        }
        0x80..=0x8F => (Mnemonic::Jcc(Condition::from_code(opcode)), vec![ctx.rel32()?]),
        0x90..=0x9F => {
            let m = ctx.modrm()?;
            (
                Mnemonic::Set(Condition::from_code(opcode)),
                vec![ctx.rm(m, Width::Byte)?],
            )
        }
        0xA3 | 0xAB | 0xB3 | 0xBB => {
            let mnemonic = match opcode {
                0xA3 => Mnemonic::Bt,
                0xAB => Mnemonic::Bts,
                0xB3 => Mnemonic::Btr,
                _ => Mnemonic::Btc,
            };
            let m = ctx.modrm()?;
            (mnemonic, vec![ctx.rm(m, w)?, ctx.reg(m, w)])
        }
        0xA4 | 0xA5 | 0xAC | 0xAD => {
            let mnemonic = if opcode < 0xAC {
                Mnemonic::Shld
            } else {
                Mnemonic::Shrd
            };
            let m = ctx.modrm()?;
            let target = ctx.rm(m, w)?;
            let count = if opcode & 1 == 0 {
                ctx.imm(Width::Byte)?
            } else {
                Operand::reg(Register::Ecx, Width::Byte)
            };
            (mnemonic, vec![target, ctx.reg(m, w), count])
        }
        0xAF => {
            let m = ctx.modrm()?;
            (Mnemonic::Imul, vec![ctx.reg(m, w), ctx.rm(m, w)?])
        }
        0xB0 | 0xB1 | 0xC0 | 0xC1 => {
            let mnemonic = if opcode < 0xC0 {
                Mnemonic::Cmpxchg
            } else {
                Mnemonic::Xadd
            };
            let width = width_bit(ctx, opcode);
            let m = ctx.modrm()?;
            (mnemonic, vec![ctx.rm(m, width)?, ctx.reg(m, width)])
        }
        0xB6 | 0xB7 | 0xBE | 0xBF => {
            let mnemonic = if opcode < 0xBE {
                Mnemonic::Movzx
            } else {
                Mnemonic::Movsx
            };
            let source = if opcode & 1 == 0 {
                Width::Byte
            } else {
                Width::Word
            };
            let m = ctx.modrm()?;
            (mnemonic, vec![ctx.reg(m, w), ctx.rm(m, source)?])
        }
        0xBA => {
            let m = ctx.modrm()?;
            let mnemonic = match m.reg {
                4 => Mnemonic::Bt,
                5 => Mnemonic::Bts,
                6 => Mnemonic::Btr,
                7 => Mnemonic::Btc,
                _ => return None,
            };
            (mnemonic, vec![ctx.rm(m, w)?, ctx.imm(Width::Byte)?])
        }
        0xBC | 0xBD => {
            let mnemonic = if opcode == 0xBC {
                Mnemonic::Bsf
            } else {
                Mnemonic::Bsr
            };
            let m = ctx.modrm()?;
            (mnemonic, vec![ctx.reg(m, w), ctx.rm(m, w)?])
        }
        0xC8..=0xCF => (Mnemonic::Bswap, vec![gpr(opcode, Width::Dword)]),
        _ => return None,
    };
    Some(decoded)
}

#[cfg(test)]
mod tests {
    use crate::decoder::decode_at;
    use rstest::rstest;

    #[rstest]
    #[case(&[0x01, 0xD8], "add eax, ebx")]
    #[case(&[0x08, 0xE9], "or cl, ch")]
    #[case(&[0x3C, 0x42], "cmp al, 0x42")]
    #[case(&[0x35, 0x78, 0x56, 0x34, 0x12], "xor eax, 0x12345678")]
    #[case(&[0x66, 0x05, 0x34, 0x12], "add ax, 0x1234")]
    #[case(&[0x41], "inc ecx")]
    #[case(&[0x4F], "dec edi")]
    #[case(&[0x55], "push ebp")]
    #[case(&[0x5D], "pop ebp")]
    #[case(&[0x6A, 0x05], "push 0x05")]
    #[case(&[0x68, 0x00, 0x10, 0x40, 0x00], "push 0x00401000")]
    #[case(&[0x6B, 0xC0, 0x0C], "imul eax, eax, 0x0000000C")]
    #[case(&[0x74, 0x2D], "jz 0x0000002F")]
    #[case(&[0x80, 0x39, 0x05], "cmp byte ptr [ecx], 0x05")]
    #[case(&[0x81, 0x43, 0x10, 0x42, 0x00, 0x00, 0x00], "add dword ptr [ebx+0x10], 0x42")]
    #[case(&[0x83, 0xE0, 0xF0], "and eax, 0xFFFFFFF0")]
    #[case(&[0x83, 0xEC, 0x10], "sub esp, 0x00000010")]
    #[case(&[0x85, 0xC0], "test eax, eax")]
    #[case(&[0x87, 0xD9], "xchg ecx, ebx")]
    #[case(&[0x88, 0x44, 0x8B, 0x41], "mov byte ptr [ebx+ecx*4+0x41], al")]
    #[case(&[0x89, 0xE5], "mov ebp, esp")]
    #[case(&[0x8B, 0x4D, 0xFC], "mov ecx, dword ptr [ebp-0x04]")]
    #[case(&[0x8B, 0x45, 0x08], "mov eax, dword ptr [ebp+0x08]")]
    #[case(&[0x8D, 0x44, 0x8A, 0x10], "lea eax, [edx+ecx*4+0x10]")]
    #[case(&[0x8D, 0x7E, 0xFC], "lea edi, [esi-0x04]")]
    #[case(&[0x8F, 0xC0], "pop eax")]
    #[case(&[0x90], "nop")]
    #[case(&[0x93], "xchg eax, ebx")]
    #[case(&[0x99], "cdq")]
    #[case(&[0xA1, 0x78, 0x56, 0x34, 0x12], "mov eax, [0x12345678]")]
    #[case(&[0xA3, 0x78, 0x56, 0x34, 0x12], "mov [0x12345678], eax")]
    #[case(&[0xAB], "stos dword ptr [edi], eax")]
    #[case(&[0xB1, 0x02], "mov cl, 0x02")]
    #[case(&[0xBB, 0x00, 0x00, 0x00, 0x00], "mov ebx, 0x00")]
    #[case(&[0xC1, 0xE0, 0x02], "shl eax, 0x02")]
    #[case(&[0xC2, 0x34, 0x12], "ret 0x1234")]
    #[case(&[0xC2, 0x08, 0x00], "ret 0x8")]
    #[case(&[0xC6, 0x01, 0x05], "mov byte ptr [ecx], 0x05")]
    #[case(&[0xC7, 0x44, 0x24, 0x10, 0x78, 0x56, 0x34, 0x12], "mov dword ptr [esp+0x10], 0x12345678")]
    #[case(&[0xC9], "leave")]
    #[case(&[0xCC], "int3")]
    #[case(&[0xCD, 0x80], "int 0x80")]
    #[case(&[0xD1, 0xF8], "sar eax, 0x01")]
    #[case(&[0xD3, 0xE2], "shl edx, cl")]
    #[case(&[0xE2, 0xFE], "loop 0x00000000")]
    #[case(&[0xE8, 0x00, 0x00, 0x00, 0x00], "call 0x00000005")]
    #[case(&[0xF6, 0xC4, 0x01], "test ah, 0x01")]
    #[case(&[0xF7, 0xD8], "neg eax")]
    #[case(&[0xF7, 0xF9], "idiv ecx")]
    #[case(&[0xF7, 0x20], "mul dword ptr [eax]")]
    #[case(&[0xFE, 0xC0], "inc al")]
    #[case(&[0xFF, 0x10], "call dword ptr [eax]")]
    #[case(&[0xFF, 0xE0], "jmp eax")]
    #[case(&[0xFF, 0x75, 0x08], "push dword ptr [ebp+0x08]")]
    fn test_one_byte_opcodes(#[case] bytes: &[u8], #[case] expected: &str) {
        let insn = decode_at(bytes, 0).unwrap();
        assert_eq!(insn.assembly(), expected);
        assert_eq!(insn.length as usize, bytes.len());
    }

    #[rstest]
    #[case(&[0x0F, 0x84, 0x10, 0x00, 0x00, 0x00], "jz 0x00000016")]
    #[case(&[0x0F, 0x8F, 0xFA, 0xFF, 0xFF, 0xFF], "jg 0x00000000")]
    #[case(&[0x0F, 0x94, 0xC0], "setz al")]
    #[case(&[0x0F, 0x4C, 0xC1], "cmovl eax, ecx")]
    #[case(&[0x0F, 0xB6, 0x45, 0xFF], "movzx eax, byte ptr [ebp-0x01]")]
    #[case(&[0x0F, 0xBF, 0xC1], "movsx eax, cx")]
    #[case(&[0x0F, 0xAF, 0xC2], "imul eax, edx")]
    #[case(&[0x0F, 0xA2], "cpuid")]
    #[case(&[0x0F, 0x31], "rdtsc")]
    #[case(&[0x0F, 0x0B], "ud2")]
    #[case(&[0x0F, 0xC8], "bswap eax")]
    #[case(&[0x0F, 0xBA, 0xE0, 0x03], "bt eax, 0x03")]
    #[case(&[0x0F, 0xA4, 0xD0, 0x04], "shld eax, edx, 0x04")]
    #[case(&[0x0F, 0xAD, 0xD0], "shrd eax, edx, cl")]
    #[case(&[0x0F, 0xC1, 0x01], "xadd dword ptr [ecx], eax")]
    #[case(&[0x0F, 0xBC, 0xC1], "bsf eax, ecx")]
    #[case(&[0x0F, 0x1F, 0x40, 0x00], "nop dword ptr [eax+0x00]")]
    fn test_two_byte_opcodes(#[case] bytes: &[u8], #[case] expected: &str) {
        let insn = decode_at(bytes, 0).unwrap();
        assert_eq!(insn.assembly(), expected);
        assert_eq!(insn.length as usize, bytes.len());
    }

    #[rstest]
    #[case(&[0x06])]
    #[case(&[0x27])]
    #[case(&[0x8D, 0xC0])]
    #[case(&[0xC6, 0x08, 0x05])]
    #[case(&[0xFF, 0xF8])]
    #[case(&[0x0F, 0xBA, 0xC0, 0x01])]
    #[case(&[0x67, 0x8B, 0x00])]
    fn test_invalid_encodings_are_unknown(#[case] bytes: &[u8]) {
        let insn = decode_at(bytes, 0).unwrap();
        assert_eq!(insn.mnemonic.name(), "db");
        assert_eq!(insn.length, 1);
    }
}
