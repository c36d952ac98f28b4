//! x87 escape opcodes `D8`-`DF`.

use crate::instruction::Mnemonic;
use crate::operand::{FpuRegister, Operand, Register, Width};

use super::opcode::Decoded;
use super::DecodeContext;

/// Arithmetic row shared by `D8`/`DC` (memory and `st(0), st(i)` forms).
const ARITH: [Mnemonic; 8] = [
    Mnemonic::Fadd,
    Mnemonic::Fmul,
    Mnemonic::Fcom,
    Mnemonic::Fcomp,
    Mnemonic::Fsub,
    Mnemonic::Fsubr,
    Mnemonic::Fdiv,
    Mnemonic::Fdivr,
];

/// Integer arithmetic row shared by `DA`/`DE` memory forms.
const INT_ARITH: [Mnemonic; 8] = [
    Mnemonic::Fiadd,
    Mnemonic::Fimul,
    Mnemonic::Ficom,
    Mnemonic::Ficomp,
    Mnemonic::Fisub,
    Mnemonic::Fisubr,
    Mnemonic::Fidiv,
    Mnemonic::Fidivr,
];

/// Operation and access width of a memory-form escape, `None` width for
/// environment and state images.
fn memory_form(opcode: u8, reg: u8) -> Option<(Mnemonic, Option<Width>)> {
    use Mnemonic::*;
    let reg = reg as usize;
    let form = match (opcode, reg) {
        (0xD8, _) => (ARITH[reg], Some(Width::Dword)),
        (0xDC, _) => (ARITH[reg], Some(Width::Qword)),
        (0xDA, _) => (INT_ARITH[reg], Some(Width::Dword)),
        (0xDE, _) => (INT_ARITH[reg], Some(Width::Word)),

        (0xD9, 0) => (Fld, Some(Width::Dword)),
        (0xD9, 2) => (Fst, Some(Width::Dword)),
        (0xD9, 3) => (Fstp, Some(Width::Dword)),
        (0xD9, 4) => (Fldenv, None),
        (0xD9, 5) => (Fldcw, Some(Width::Word)),
        (0xD9, 6) => (Fnstenv, None),
        (0xD9, 7) => (Fnstcw, Some(Width::Word)),

        (0xDB, 0) => (Fild, Some(Width::Dword)),
        (0xDB, 1) => (Fisttp, Some(Width::Dword)),
        (0xDB, 2) => (Fist, Some(Width::Dword)),
        (0xDB, 3) => (Fistp, Some(Width::Dword)),
        (0xDB, 5) => (Fld, Some(Width::Tbyte)),
        (0xDB, 7) => (Fstp, Some(Width::Tbyte)),

        (0xDD, 0) => (Fld, Some(Width::Qword)),
        (0xDD, 1) => (Fisttp, Some(Width::Qword)),
        (0xDD, 2) => (Fst, Some(Width::Qword)),
        (0xDD, 3) => (Fstp, Some(Width::Qword)),
        (0xDD, 4) => (Frstor, None),
        (0xDD, 6) => (Fnsave, None),
        (0xDD, 7) => (Fnstsw, Some(Width::Word)),

        (0xDF, 0) => (Fild, Some(Width::Word)),
        (0xDF, 1) => (Fisttp, Some(Width::Word)),
        (0xDF, 2) => (Fist, Some(Width::Word)),
        (0xDF, 3) => (Fistp, Some(Width::Word)),
        (0xDF, 4) => (Fbld, Some(Width::Tbyte)),
        (0xDF, 5) => (Fild, Some(Width::Qword)),
        (0xDF, 6) => (Fbstp, Some(Width::Tbyte)),
        (0xDF, 7) => (Fistp, Some(Width::Qword)),

        _ => return None,
    };
    Some(form)
}

fn st(index: u8) -> Operand {
    Operand::FpuRegister(FpuRegister(index))
}

/// Register-form escape (`mod == 11`).
fn register_form(opcode: u8, reg: u8, rm: u8) -> Option<Decoded> {
    use Mnemonic::*;
    let to_st0 = |mnemonic| (mnemonic, vec![st(0), st(rm)]);
    let from_st0 = |mnemonic| (mnemonic, vec![st(rm), st(0)]);
    let single = |mnemonic| (mnemonic, vec![st(rm)]);
    let bare = |mnemonic| (mnemonic, Vec::new());

    let decoded = match (opcode, reg) {
        (0xD8, 2 | 3) => single(ARITH[reg as usize]),
        (0xD8, _) => to_st0(ARITH[reg as usize]),

        (0xD9, 0) => single(Fld),
        (0xD9, 1) => single(Fxch),
        (0xD9, 2) if rm == 0 => bare(Fnop),
        (0xD9, 4) => bare(match rm {
            0 => Fchs,
            1 => Fabs,
            4 => Ftst,
            5 => Fxam,
            _ => return None,
        }),
        (0xD9, 5) => bare(match rm {
            0 => Fld1,
            1 => Fldl2t,
            2 => Fldl2e,
            3 => Fldpi,
            4 => Fldlg2,
            5 => Fldln2,
            6 => Fldz,
            _ => return None,
        }),
        (0xD9, 6) => bare(
            [F2xm1, Fyl2x, Fptan, Fpatan, Fxtract, Fprem1, Fdecstp, Fincstp][rm as usize],
        ),
        (0xD9, 7) => bare(
            [Fprem, Fyl2xp1, Fsqrt, Fsincos, Frndint, Fscale, Fsin, Fcos][rm as usize],
        ),

        (0xDA, 0) => to_st0(Fcmovb),
        (0xDA, 1) => to_st0(Fcmove),
        (0xDA, 2) => to_st0(Fcmovbe),
        (0xDA, 3) => to_st0(Fcmovu),
        (0xDA, 5) if rm == 1 => bare(Fucompp),

        (0xDB, 0) => to_st0(Fcmovnb),
        (0xDB, 1) => to_st0(Fcmovne),
        (0xDB, 2) => to_st0(Fcmovnbe),
        (0xDB, 3) => to_st0(Fcmovnu),
        (0xDB, 4) if rm == 2 => bare(Fnclex),
        (0xDB, 4) if rm == 3 => bare(Fninit),
        (0xDB, 5) => to_st0(Fucomi),
        (0xDB, 6) => to_st0(Fcomi),

        // reversed operand order swaps the sub/div encodings
        (0xDC, 0) => from_st0(Fadd),
        (0xDC, 1) => from_st0(Fmul),
        (0xDC, 4) => from_st0(Fsubr),
        (0xDC, 5) => from_st0(Fsub),
        (0xDC, 6) => from_st0(Fdivr),
        (0xDC, 7) => from_st0(Fdiv),

        (0xDD, 0) => single(Ffree),
        (0xDD, 2) => single(Fst),
        (0xDD, 3) => single(Fstp),
        (0xDD, 4) => single(Fucom),
        (0xDD, 5) => single(Fucomp),

        (0xDE, 0) => from_st0(Faddp),
        (0xDE, 1) => from_st0(Fmulp),
        (0xDE, 3) if rm == 1 => bare(Fcompp),
        (0xDE, 4) => from_st0(Fsubrp),
        (0xDE, 5) => from_st0(Fsubp),
        (0xDE, 6) => from_st0(Fdivrp),
        (0xDE, 7) => from_st0(Fdivp),

        (0xDF, 4) if rm == 0 => (Fnstsw, vec![Operand::reg(Register::Eax, Width::Word)]),
        (0xDF, 5) => to_st0(Fucomip),
        (0xDF, 6) => to_st0(Fcomip),

        _ => return None,
    };
    Some(decoded)
}

/// Decode an escape opcode and its ModR/M byte.
pub fn decode(ctx: &mut DecodeContext<'_>, opcode: u8) -> Option<Decoded> {
    let m = ctx.modrm()?;
    if m.is_register() {
        return register_form(opcode, m.reg, m.rm);
    }
    let (mnemonic, width) = memory_form(opcode, m.reg)?;
    Some((mnemonic, vec![ctx.memory(m, width)?]))
}
