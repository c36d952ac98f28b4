//! Decoded instruction, operation kinds and condition codes.

use std::fmt;

use crate::operand::Operand;
use crate::{Address, MAX_INSTRUCTION_SIZE};

/// x86 condition code, in encoding order (the low nibble of `7x`/`0F 8x`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Overflow,
    NotOverflow,
    Below,
    AboveOrEqual,
    Zero,
    NotZero,
    BelowOrEqual,
    Above,
    Sign,
    NotSign,
    Parity,
    NotParity,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Greater,
}

const CONDITIONS: [Condition; 16] = [
    Condition::Overflow,
    Condition::NotOverflow,
    Condition::Below,
    Condition::AboveOrEqual,
    Condition::Zero,
    Condition::NotZero,
    Condition::BelowOrEqual,
    Condition::Above,
    Condition::Sign,
    Condition::NotSign,
    Condition::Parity,
    Condition::NotParity,
    Condition::Less,
    Condition::GreaterOrEqual,
    Condition::LessOrEqual,
    Condition::Greater,
];

const JCC_NAMES: [&str; 16] = [
    "jo", "jno", "jb", "jae", "jz", "jnz", "jbe", "ja", "js", "jns", "jp", "jnp", "jl", "jge",
    "jle", "jg",
];
const SET_NAMES: [&str; 16] = [
    "seto", "setno", "setb", "setae", "setz", "setnz", "setbe", "seta", "sets", "setns", "setp",
    "setnp", "setl", "setge", "setle", "setg",
];
const CMOV_NAMES: [&str; 16] = [
    "cmovo", "cmovno", "cmovb", "cmovae", "cmovz", "cmovnz", "cmovbe", "cmova", "cmovs",
    "cmovns", "cmovp", "cmovnp", "cmovl", "cmovge", "cmovle", "cmovg",
];

impl Condition {
    /// Condition selected by the low nibble of an opcode.
    pub fn from_code(code: u8) -> Condition {
        CONDITIONS[(code & 0x0F) as usize]
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The logically opposite condition. Conditions come in pairs that differ
    /// only in the lowest bit.
    pub fn negate(self) -> Condition {
        Condition::from_code(self.code() ^ 1)
    }

    /// C comparison operator for the condition when it follows `cmp a, b`.
    ///
    /// Flag-only conditions (overflow, sign, parity) have no direct operator.
    pub fn operator(self) -> Option<&'static str> {
        match self {
            Condition::Zero => Some("=="),
            Condition::NotZero => Some("!="),
            Condition::Below | Condition::Less => Some("<"),
            Condition::AboveOrEqual | Condition::GreaterOrEqual => Some(">="),
            Condition::BelowOrEqual | Condition::LessOrEqual => Some("<="),
            Condition::Above | Condition::Greater => Some(">"),
            _ => None,
        }
    }
}

/// Control-flow behaviour of an instruction, as seen by the CFG builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Sequential,
    ConditionalJump,
    Jump,
    Call,
    Return,
    /// Ends the block without a successor: `int3`, `hlt`, `ud2`.
    Halt,
}

/// Operation kind of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    // data transfer
    Mov,
    Movzx,
    Movsx,
    Lea,
    Xchg,
    Push,
    Pop,
    Pushad,
    Popad,
    Pushfd,
    Popfd,
    Cbw,
    Cwde,
    Cwd,
    Cdq,
    Sahf,
    Lahf,
    Bswap,
    Cmpxchg,
    Xadd,
    Cmov(Condition),
    Set(Condition),
    In,
    Out,

    // arithmetic
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    Inc,
    Dec,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,

    // logic, shifts and bits
    And,
    Or,
    Xor,
    Not,
    Test,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,
    Shld,
    Shrd,
    Bt,
    Bts,
    Btr,
    Btc,
    Bsf,
    Bsr,

    // control flow
    Jmp,
    Jcc(Condition),
    Jecxz,
    Loop,
    Loope,
    Loopne,
    Call,
    Ret,
    Retf,
    Iret,
    Int,
    Int3,
    Into,
    Enter,
    Leave,
    Hlt,

    // flags and system
    Clc,
    Stc,
    Cli,
    Sti,
    Cld,
    Std,
    Cmc,
    Nop,
    Wait,
    Cpuid,
    Rdtsc,
    Ud2,

    // strings
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
    RepMovs,
    RepStos,
    RepLods,
    RepeCmps,
    RepeScas,
    RepneCmps,
    RepneScas,

    // x87
    Fld,
    Fild,
    Fbld,
    Fst,
    Fstp,
    Fist,
    Fistp,
    Fisttp,
    Fbstp,
    Fadd,
    Faddp,
    Fiadd,
    Fsub,
    Fsubp,
    Fsubr,
    Fsubrp,
    Fisub,
    Fisubr,
    Fmul,
    Fmulp,
    Fimul,
    Fdiv,
    Fdivp,
    Fdivr,
    Fdivrp,
    Fidiv,
    Fidivr,
    Fcom,
    Fcomp,
    Fcompp,
    Ficom,
    Ficomp,
    Fucom,
    Fucomp,
    Fucompp,
    Fcomi,
    Fcomip,
    Fucomi,
    Fucomip,
    Fcmovb,
    Fcmove,
    Fcmovbe,
    Fcmovu,
    Fcmovnb,
    Fcmovne,
    Fcmovnbe,
    Fcmovnu,
    Fxch,
    Fchs,
    Fabs,
    Ftst,
    Fxam,
    Fld1,
    Fldl2t,
    Fldl2e,
    Fldpi,
    Fldlg2,
    Fldln2,
    Fldz,
    F2xm1,
    Fyl2x,
    Fptan,
    Fpatan,
    Fxtract,
    Fprem1,
    Fdecstp,
    Fincstp,
    Fprem,
    Fyl2xp1,
    Fsqrt,
    Fsincos,
    Frndint,
    Fscale,
    Fsin,
    Fcos,
    Fnop,
    Ffree,
    Fldcw,
    Fnstcw,
    Fldenv,
    Fnstenv,
    Frstor,
    Fnsave,
    Fnstsw,
    Fnclex,
    Fninit,

    /// A prefix byte with nothing after it.
    Prefix(u8),
    /// Unrecognized or truncated encoding; consumes one byte.
    Unknown,
}

impl Mnemonic {
    /// Lowercase assembler name.
    pub fn name(self) -> &'static str {
        use Mnemonic::*;
        match self {
            Mov => "mov",
            Movzx => "movzx",
            Movsx => "movsx",
            Lea => "lea",
            Xchg => "xchg",
            Push => "push",
            Pop => "pop",
            Pushad => "pushad",
            Popad => "popad",
            Pushfd => "pushfd",
            Popfd => "popfd",
            Cbw => "cbw",
            Cwde => "cwde",
            Cwd => "cwd",
            Cdq => "cdq",
            Sahf => "sahf",
            Lahf => "lahf",
            Bswap => "bswap",
            Cmpxchg => "cmpxchg",
            Xadd => "xadd",
            Cmov(c) => CMOV_NAMES[c.code() as usize],
            Set(c) => SET_NAMES[c.code() as usize],
            In => "in",
            Out => "out",
            Add => "add",
            Adc => "adc",
            Sub => "sub",
            Sbb => "sbb",
            Cmp => "cmp",
            Inc => "inc",
            Dec => "dec",
            Neg => "neg",
            Mul => "mul",
            Imul => "imul",
            Div => "div",
            Idiv => "idiv",
            And => "and",
            Or => "or",
            Xor => "xor",
            Not => "not",
            Test => "test",
            Rol => "rol",
            Ror => "ror",
            Rcl => "rcl",
            Rcr => "rcr",
            Shl => "shl",
            Shr => "shr",
            Sar => "sar",
            Shld => "shld",
            Shrd => "shrd",
            Bt => "bt",
            Bts => "bts",
            Btr => "btr",
            Btc => "btc",
            Bsf => "bsf",
            Bsr => "bsr",
            Jmp => "jmp",
            Jcc(c) => JCC_NAMES[c.code() as usize],
            Jecxz => "jecxz",
            Loop => "loop",
            Loope => "loope",
            Loopne => "loopne",
            Call => "call",
            Ret => "ret",
            Retf => "retf",
            Iret => "iretd",
            Int => "int",
            Int3 => "int3",
            Into => "into",
            Enter => "enter",
            Leave => "leave",
            Hlt => "hlt",
            Clc => "clc",
            Stc => "stc",
            Cli => "cli",
            Sti => "sti",
            Cld => "cld",
            Std => "std",
            Cmc => "cmc",
            Nop => "nop",
            Wait => "wait",
            Cpuid => "cpuid",
            Rdtsc => "rdtsc",
            Ud2 => "ud2",
            Movs => "movs",
            Cmps => "cmps",
            Stos => "stos",
            Lods => "lods",
            Scas => "scas",
            RepMovs => "rep movs",
            RepStos => "rep stos",
            RepLods => "rep lods",
            RepeCmps => "repe cmps",
            RepeScas => "repe scas",
            RepneCmps => "repne cmps",
            RepneScas => "repne scas",
            Fld => "fld",
            Fild => "fild",
            Fbld => "fbld",
            Fst => "fst",
            Fstp => "fstp",
            Fist => "fist",
            Fistp => "fistp",
            Fisttp => "fisttp",
            Fbstp => "fbstp",
            Fadd => "fadd",
            Faddp => "faddp",
            Fiadd => "fiadd",
            Fsub => "fsub",
            Fsubp => "fsubp",
            Fsubr => "fsubr",
            Fsubrp => "fsubrp",
            Fisub => "fisub",
            Fisubr => "fisubr",
            Fmul => "fmul",
            Fmulp => "fmulp",
            Fimul => "fimul",
            Fdiv => "fdiv",
            Fdivp => "fdivp",
            Fdivr => "fdivr",
            Fdivrp => "fdivrp",
            Fidiv => "fidiv",
            Fidivr => "fidivr",
            Fcom => "fcom",
            Fcomp => "fcomp",
            Fcompp => "fcompp",
            Ficom => "ficom",
            Ficomp => "ficomp",
            Fucom => "fucom",
            Fucomp => "fucomp",
            Fucompp => "fucompp",
            Fcomi => "fcomi",
            Fcomip => "fcomip",
            Fucomi => "fucomi",
            Fucomip => "fucomip",
            Fcmovb => "fcmovb",
            Fcmove => "fcmove",
            Fcmovbe => "fcmovbe",
            Fcmovu => "fcmovu",
            Fcmovnb => "fcmovnb",
            Fcmovne => "fcmovne",
            Fcmovnbe => "fcmovnbe",
            Fcmovnu => "fcmovnu",
            Fxch => "fxch",
            Fchs => "fchs",
            Fabs => "fabs",
            Ftst => "ftst",
            Fxam => "fxam",
            Fld1 => "fld1",
            Fldl2t => "fldl2t",
            Fldl2e => "fldl2e",
            Fldpi => "fldpi",
            Fldlg2 => "fldlg2",
            Fldln2 => "fldln2",
            Fldz => "fldz",
            F2xm1 => "f2xm1",
            Fyl2x => "fyl2x",
            Fptan => "fptan",
            Fpatan => "fpatan",
            Fxtract => "fxtract",
            Fprem1 => "fprem1",
            Fdecstp => "fdecstp",
            Fincstp => "fincstp",
            Fprem => "fprem",
            Fyl2xp1 => "fyl2xp1",
            Fsqrt => "fsqrt",
            Fsincos => "fsincos",
            Frndint => "frndint",
            Fscale => "fscale",
            Fsin => "fsin",
            Fcos => "fcos",
            Fnop => "fnop",
            Ffree => "ffree",
            Fldcw => "fldcw",
            Fnstcw => "fnstcw",
            Fldenv => "fldenv",
            Fnstenv => "fnstenv",
            Frstor => "frstor",
            Fnsave => "fnsave",
            Fnstsw => "fnstsw",
            Fnclex => "fnclex",
            Fninit => "fninit",
            Prefix(byte) => prefix_name(byte),
            Unknown => "db",
        }
    }

    /// How this instruction affects control flow.
    pub fn flow(self) -> FlowKind {
        match self {
            Mnemonic::Jcc(_)
            | Mnemonic::Jecxz
            | Mnemonic::Loop
            | Mnemonic::Loope
            | Mnemonic::Loopne => FlowKind::ConditionalJump,
            Mnemonic::Jmp => FlowKind::Jump,
            Mnemonic::Call => FlowKind::Call,
            Mnemonic::Ret | Mnemonic::Retf | Mnemonic::Iret => FlowKind::Return,
            Mnemonic::Int3 | Mnemonic::Hlt | Mnemonic::Ud2 => FlowKind::Halt,
            _ => FlowKind::Sequential,
        }
    }

    /// Remap a string operation to its repeated form.
    ///
    /// `repne` is `false` for F3 and `true` for F2. `movs`, `stos` and `lods`
    /// ignore the distinction and take the plain `rep` form.
    pub fn with_rep(self, repne: bool) -> Mnemonic {
        match (self, repne) {
            (Mnemonic::Movs, _) => Mnemonic::RepMovs,
            (Mnemonic::Stos, _) => Mnemonic::RepStos,
            (Mnemonic::Lods, _) => Mnemonic::RepLods,
            (Mnemonic::Cmps, false) => Mnemonic::RepeCmps,
            (Mnemonic::Cmps, true) => Mnemonic::RepneCmps,
            (Mnemonic::Scas, false) => Mnemonic::RepeScas,
            (Mnemonic::Scas, true) => Mnemonic::RepneScas,
            (other, _) => other,
        }
    }

    /// True for the plain and repeated string operations.
    pub fn is_string_op(self) -> bool {
        use Mnemonic::*;
        matches!(
            self,
            Movs | Cmps
                | Stos
                | Lods
                | Scas
                | RepMovs
                | RepStos
                | RepLods
                | RepeCmps
                | RepeScas
                | RepneCmps
                | RepneScas
        )
    }

    /// True when the first operand is overwritten by the operation.
    pub fn writes_destination(self) -> bool {
        use Mnemonic::*;
        matches!(
            self,
            Mov | Movzx
                | Movsx
                | Lea
                | Xchg
                | Pop
                | Bswap
                | Cmpxchg
                | Xadd
                | Cmov(_)
                | Set(_)
                | In
                | Add
                | Adc
                | Sub
                | Sbb
                | Inc
                | Dec
                | Neg
                | Imul
                | And
                | Or
                | Xor
                | Not
                | Rol
                | Ror
                | Rcl
                | Rcr
                | Shl
                | Shr
                | Sar
                | Shld
                | Shrd
                | Bts
                | Btr
                | Btc
                | Bsf
                | Bsr
                | Fist
                | Fistp
                | Fisttp
                | Fst
                | Fstp
                | Fnstsw
        )
    }

    /// x87 loads and stores of floating point values.
    pub fn is_float_transfer(self) -> bool {
        matches!(self, Mnemonic::Fld | Mnemonic::Fst | Mnemonic::Fstp)
    }

    /// x87 loads and stores of integer values.
    pub fn is_integer_fpu_transfer(self) -> bool {
        matches!(
            self,
            Mnemonic::Fild | Mnemonic::Fist | Mnemonic::Fistp | Mnemonic::Fisttp
        )
    }
}

/// Display name of a dangling prefix byte.
pub fn prefix_name(byte: u8) -> &'static str {
    match byte {
        0xF0 => "lock",
        0xF2 => "repne",
        0xF3 => "rep",
        0x66 => "data16",
        0x67 => "addr16",
        0x26 => "es",
        0x2E => "cs",
        0x36 => "ss",
        0x3E => "ds",
        0x64 => "fs",
        0x65 => "gs",
        _ => "db",
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded instruction. Immutable once produced by the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Virtual address of the first byte, prefixes included.
    pub address: Address,
    /// Operation kind.
    pub mnemonic: Mnemonic,
    /// Operands in Intel order (destination first).
    pub operands: Vec<Operand>,
    /// Encoded length in bytes.
    pub length: u8,
    /// Raw encoding, valid up to `length`.
    pub bytes: [u8; MAX_INSTRUCTION_SIZE],
    /// A `lock` prefix was applied.
    pub lock: bool,
}

impl Instruction {
    /// Build an instruction, copying its encoding out of `raw`.
    pub fn new(address: Address, mnemonic: Mnemonic, operands: Vec<Operand>, raw: &[u8]) -> Self {
        let length = raw.len().min(MAX_INSTRUCTION_SIZE);
        let mut bytes = [0u8; MAX_INSTRUCTION_SIZE];
        bytes[..length].copy_from_slice(&raw[..length]);
        Self {
            address,
            mnemonic,
            operands,
            length: length as u8,
            bytes,
            lock: false,
        }
    }

    /// The one-byte `db` placeholder for an undecodable byte.
    pub fn unknown(address: Address, byte: u8) -> Self {
        Self::new(
            address,
            Mnemonic::Unknown,
            vec![Operand::imm(byte as u32, crate::operand::Width::Byte)],
            &[byte],
        )
    }

    /// Encoded bytes of this instruction.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.length as usize]
    }

    /// Address of the following instruction.
    pub fn next_address(&self) -> Address {
        self.address + self.length as Address
    }

    pub fn flow(&self) -> FlowKind {
        self.mnemonic.flow()
    }

    /// Direct branch target, if the first operand is a resolved relative offset.
    pub fn branch_target(&self) -> Option<Address> {
        match self.operands.first() {
            Some(Operand::RelativeOffset { target }) => Some(*target as Address),
            _ => None,
        }
    }

    /// Mnemonic text including a `lock ` prefix when present.
    pub fn mnemonic_text(&self) -> String {
        if self.lock {
            format!("lock {}", self.mnemonic.name())
        } else {
            self.mnemonic.name().to_string()
        }
    }

    /// Comma separated operand text, empty for operand-less instructions.
    pub fn operands_text(&self) -> String {
        self.operands
            .iter()
            .map(|op| op.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Uppercase hex bytes separated by single spaces.
    pub fn bytes_text(&self) -> String {
        self.bytes()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `mnemonic operands` without address or bytes.
    pub fn assembly(&self) -> String {
        let operands = self.operands_text();
        if operands.is_empty() {
            self.mnemonic_text()
        } else {
            format!("{} {}", self.mnemonic_text(), operands)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}  {:<24}  {}",
            self.address,
            self.bytes_text(),
            self.assembly()
        )
    }
}
