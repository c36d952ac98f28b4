//! Stack frame, variable and signature recovery.

use std::collections::BTreeMap;

use crate::instruction::{FlowKind, Instruction, Mnemonic};
use crate::operand::{Register, Width};
use crate::types::{CallingConvention, DataType, Function, StackFrame, Storage, Variable};

/// Frame offsets beyond this distance from `ebp` are not treated as variables.
const FRAME_WINDOW: i32 = 1000;

/// First argument slot, above the saved `ebp` and the return address.
const FIRST_PARAMETER_OFFSET: i32 = 8;

/// Size of a slot whose accesses carry no width.
const DEFAULT_SIZE: u32 = 4;

/// Fill in frame, parameters, locals, register variables, calling convention
/// and return type. Reads the data-flow snapshots already in the context.
pub fn analyze(function: &mut Function) {
    function.frame = find_frame(function.asm.instructions());
    if function.frame.is_some() {
        collect_stack_variables(function);
    }
    collect_register_variables(function);
    function.calling_convention = calling_convention(function);
    function.return_type = return_type(function);

    log::debug!(
        "Variables of 0x{:08X}: {} parameters, {} locals, {} register variables, {}",
        function.address,
        function.parameters.len(),
        function.locals.len(),
        function.register_variables.len(),
        function.calling_convention
    );
}

fn is_push_ebp(insn: &Instruction) -> bool {
    insn.mnemonic == Mnemonic::Push
        && insn
            .operands
            .first()
            .is_some_and(|op| op.is_dword_register(Register::Ebp))
}

fn is_mov_ebp_esp(insn: &Instruction) -> bool {
    insn.mnemonic == Mnemonic::Mov
        && insn.operands.len() == 2
        && insn.operands[0].is_dword_register(Register::Ebp)
        && insn.operands[1].is_dword_register(Register::Esp)
}

/// Immediate of a `sub esp, imm`.
fn frame_allocation(insn: &Instruction) -> Option<u32> {
    if insn.mnemonic != Mnemonic::Sub || insn.operands.len() != 2 {
        return None;
    }
    if !insn.operands[0].is_dword_register(Register::Esp) {
        return None;
    }
    insn.operands[1].as_immediate()
}

/// True if `insn` belongs to the frame setup or teardown sequence.
pub fn is_frame_instruction(insn: &Instruction) -> bool {
    is_push_ebp(insn)
        || is_mov_ebp_esp(insn)
        || frame_allocation(insn).is_some()
        || insn.mnemonic == Mnemonic::Leave
        || (insn.mnemonic == Mnemonic::Pop
            && insn
                .operands
                .first()
                .is_some_and(|op| op.is_dword_register(Register::Ebp)))
        || (insn.mnemonic == Mnemonic::Mov
            && insn.operands.len() == 2
            && insn.operands[0].is_dword_register(Register::Esp)
            && insn.operands[1].is_dword_register(Register::Ebp))
}

/// Find `push ebp` directly followed by `mov ebp, esp`.
fn find_frame<'a>(instructions: impl Iterator<Item = &'a Instruction>) -> Option<StackFrame> {
    let instructions: Vec<&Instruction> = instructions.collect();
    instructions.windows(2).enumerate().find_map(|(i, pair)| {
        if !(is_push_ebp(pair[0]) && is_mov_ebp_esp(pair[1])) {
            return None;
        }
        let locals_size = instructions
            .get(i + 2)
            .and_then(|insn| frame_allocation(insn))
            .unwrap_or(0);
        Some(StackFrame {
            prologue: pair[0].address,
            locals_size,
        })
    })
}

/// Type hint carried by the instruction that touches a frame slot.
fn usage_type(insn: &Instruction) -> Option<DataType> {
    match insn.mnemonic {
        Mnemonic::Cmp | Mnemonic::Test if insn.operands.get(1)?.as_immediate()? == 0 => {
            Some(DataType::Int)
        }
        m if m.is_float_transfer() => Some(DataType::Float),
        m if m.is_integer_fpu_transfer() => Some(DataType::Int),
        _ => None,
    }
}

fn collect_stack_variables(function: &mut Function) {
    let mut locals: BTreeMap<i32, usize> = BTreeMap::new();
    let mut parameter_hints: Vec<(usize, DataType)> = Vec::new();
    let mut parameter_sizes: BTreeMap<usize, u32> = BTreeMap::new();
    let mut max_parameter: Option<usize> = None;

    for insn in function.asm.instructions() {
        let hint = usage_type(insn);
        for operand in &insn.operands {
            let Some(memory) = operand.as_memory() else {
                continue;
            };
            let Some(offset) = memory.frame_offset() else {
                continue;
            };
            // `lea` takes the address only and carries no width
            let size = memory.width.map(Width::bytes);

            if (FIRST_PARAMETER_OFFSET..FRAME_WINDOW).contains(&offset) {
                let index = ((offset - FIRST_PARAMETER_OFFSET) / 4) as usize;
                max_parameter = max_parameter.max(Some(index));
                if let Some(size) = size {
                    let widest = parameter_sizes.entry(index).or_insert(size);
                    *widest = (*widest).max(size);
                }
                if let Some(hint) = hint {
                    parameter_hints.push((index, hint));
                }
            } else if (-FRAME_WINDOW + 1..0).contains(&offset) {
                let slot = *locals.entry(offset).or_insert_with(|| {
                    function.locals.push(
                        Variable::new(
                            format!("local_{}", offset.unsigned_abs()),
                            Storage::Stack(offset),
                        )
                        .with_size(0),
                    );
                    function.locals.len() - 1
                });
                let local = &mut function.locals[slot];
                if let Some(size) = size {
                    local.widen(size);
                }
                if let Some(hint) = hint {
                    local.refine(hint);
                }
            }
        }
    }
    for local in &mut function.locals {
        if local.size == 0 {
            local.size = DEFAULT_SIZE;
        }
    }

    if let Some(max) = max_parameter {
        function.parameters = (0..=max)
            .map(|i| {
                Variable::new(
                    format!("param_{}", i + 1),
                    Storage::Parameter(FIRST_PARAMETER_OFFSET + 4 * i as i32),
                )
                .with_size(parameter_sizes.get(&i).copied().unwrap_or(DEFAULT_SIZE))
            })
            .collect();
    }
    for (index, hint) in parameter_hints {
        function.parameters[index].refine(hint);
    }
}

/// Registers holding a constant at the end of any block.
fn collect_register_variables(function: &mut Function) {
    let context = &function.asm.context;
    let mut seen: Vec<Register> = Vec::new();

    for block in &function.asm.blocks {
        let Some(last) = block.last_instruction() else {
            continue;
        };
        let Some(snapshot) = context.snapshot_after(last.address) else {
            continue;
        };
        for (register, info) in snapshot.iter() {
            if matches!(register, Register::Esp | Register::Ebp) || seen.contains(&register) {
                continue;
            }
            if info.constant().is_some() {
                seen.push(register);
                let mut var =
                    Variable::new(format!("reg_{}", register), Storage::Register(register));
                var.refine(DataType::Int);
                function.register_variables.push(var);
            }
        }
    }
}

fn calling_convention(function: &Function) -> CallingConvention {
    let callee_cleans = function.asm.instructions().any(|insn| {
        insn.flow() == FlowKind::Return
            && insn
                .operands
                .first()
                .and_then(|op| op.as_immediate())
                .is_some_and(|n| n > 0)
    });
    if callee_cleans {
        CallingConvention::Stdcall
    } else {
        CallingConvention::Cdecl
    }
}

/// `int` when `eax` has a tracked definition at some return.
fn return_type(function: &Function) -> DataType {
    let context = &function.asm.context;
    let returns_value = function
        .asm
        .instructions()
        .filter(|insn| insn.flow() == FlowKind::Return)
        .any(|insn| {
            context
                .snapshot_after(insn.address)
                .is_some_and(|s| s.contains(Register::Eax))
        });
    if returns_value {
        DataType::Int
    } else {
        DataType::Void
    }
}
