//! C-like pseudocode rendering.
//!
//! The body is produced by walking the CFG from the entry block. Loops whose
//! only back edge is a conditional jump become `while (cond)` or
//! `do { } while (cond)`, other loop headers become `while (true)` wrappers,
//! if/else heads become `if` statements and everything else is translated
//! instruction by instruction. Every block is rendered at most once.
//!
//! The walk runs on an explicit task stack so arbitrarily long block chains
//! do not grow the call stack.

use std::collections::HashMap;

use crate::analysis::loops::Loop;
use crate::analysis::structure::{IfElse, Structure, Switch};
use crate::analysis::variables::is_frame_instruction;
use crate::instruction::{Condition, FlowKind, Instruction, Mnemonic};
use crate::operand::{Addressing, Operand};
use crate::types::{DataType, Function, Storage};
use crate::{Address, BlockId, InstructionBlock};

const INDENT: &str = "    ";

/// Render `function` with default options and no symbol names.
pub fn render(function: &Function) -> String {
    PseudocodeGenerator::new(function).generate()
}

/// One pass of pseudocode generation over a decompiled function.
pub struct PseudocodeGenerator<'a> {
    function: &'a Function,
    symbols: Option<&'a HashMap<Address, String>>,
    emit_addresses: bool,
    out: String,
    visited: Vec<bool>,
    /// Pending work, next task last.
    tasks: Vec<Task>,
    /// Innermost loop last.
    active_loops: Vec<LoopFrame<'a>>,
    /// Merge blocks of the enclosing if/else statements.
    merges: Vec<BlockId>,
}

struct LoopFrame<'a> {
    lp: &'a Loop,
    exits: Vec<BlockId>,
    /// Back-edge block whose branch is rendered as the loop condition
    latch: Option<BlockId>,
}

enum Task {
    Block { id: BlockId, indent: usize },
    Edge { to: BlockId, indent: usize },
    Line { indent: usize, text: String },
    /// Leave the innermost if/else.
    PopMerge,
    /// Close the innermost loop with `close` and follow its exits.
    EndLoop { indent: usize, close: String },
}

impl Task {
    fn line(indent: usize, text: impl Into<String>) -> Self {
        Task::Line {
            indent,
            text: text.into(),
        }
    }
}

/// A loop closed by a single conditional back edge.
struct ConditionLatch {
    tail: BlockId,
    exit: BlockId,
    /// The branch is taken to leave the loop.
    exits_on_branch: bool,
}

impl<'a> PseudocodeGenerator<'a> {
    pub fn new(function: &'a Function) -> Self {
        Self {
            function,
            symbols: None,
            emit_addresses: true,
            out: String::new(),
            visited: vec![false; function.asm.blocks.len()],
            tasks: Vec::new(),
            active_loops: Vec::new(),
            merges: Vec::new(),
        }
    }

    /// Names for call targets; unnamed targets render as `func_XXXXXXXX`.
    pub fn with_symbols(mut self, symbols: &'a HashMap<Address, String>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Emit `// Block at` and `// Loop at` comments.
    pub fn emit_addresses(mut self, emit: bool) -> Self {
        self.emit_addresses = emit;
        self
    }

    pub fn generate(mut self) -> String {
        let function = self.function;
        self.line(0, &function.signature());
        self.line(0, "{");

        for local in &function.locals {
            let offset = local.frame_offset().unwrap_or_default();
            self.line(
                1,
                &format!(
                    "{} {}; // [ebp{}0x{:02X}]",
                    local.data_type,
                    local.name,
                    if offset < 0 { '-' } else { '+' },
                    offset.unsigned_abs()
                ),
            );
        }
        for var in &function.register_variables {
            if let Storage::Register(register) = var.storage {
                self.line(1, &format!("{} {}; // {}", var.data_type, var.name, register));
            }
        }
        if !function.locals.is_empty() || !function.register_variables.is_empty() {
            self.out.push('\n');
        }

        if let Some(entry) = function.asm.entry_block() {
            self.tasks.push(Task::Block {
                id: entry.id,
                indent: 1,
            });
        }
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Block { id, indent } => self.block(id, indent),
                Task::Edge { to, indent } => self.edge(to, indent),
                Task::Line { indent, text } => self.line(indent, &text),
                Task::PopMerge => {
                    self.merges.pop();
                }
                Task::EndLoop { indent, close } => self.end_loop(indent, &close),
            }
        }

        self.line(0, "}");
        self.out
    }

    fn line(&mut self, indent: usize, text: &str) {
        for _ in 0..indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Queue `tasks` to run next, in order.
    fn schedule(&mut self, tasks: Vec<Task>) {
        self.tasks.extend(tasks.into_iter().rev());
    }

    fn block(&mut self, id: BlockId, indent: usize) {
        if self.visited[id.0] || self.merges.contains(&id) {
            return;
        }
        let function: &'a Function = self.function;
        let block = function.asm.block(id);
        let context = &function.asm.context;

        if let Some(lp) = context.loops.by_header(block.start) {
            if !self.is_active(lp) {
                self.render_loop(lp, false, indent);
                return;
            }
        }
        // entered at the condition: the rotated `while (cond)` shape
        let rotated = context.loops.containing(id).find(|lp| {
            !self.is_active(lp)
                && !self.visited[lp.header.0]
                && self.condition_latch(lp).is_some_and(|latch| latch.tail == id)
        });
        if let Some(lp) = rotated {
            self.render_loop(lp, true, indent);
            return;
        }

        self.visited[id.0] = true;
        if self.emit_addresses {
            self.line(indent, &format!("// Block at 0x{:08X}", block.start));
        }

        match context.structure(id) {
            Some(Structure::IfElse(ie)) => self.render_if_else(block, ie, indent),
            Some(Structure::Switch(sw)) => self.render_switch(block, sw, indent),
            None => self.render_plain(block, indent),
        }
    }

    fn is_active(&self, lp: &Loop) -> bool {
        self.active_loops.iter().any(|f| f.lp.header == lp.header)
    }

    /// Follow an edge into `to` from inside the current construct.
    fn edge(&mut self, to: BlockId, indent: usize) {
        let at_loop_end = matches!(self.tasks.last(), Some(Task::EndLoop { .. }));
        let merges = &self.merges;
        let jump = self.active_loops.last_mut().and_then(|frame| {
            if to == frame.lp.header {
                return Some(Some("continue;"));
            }
            if frame.latch == Some(to) {
                if at_loop_end || merges.contains(&to) {
                    return Some(None);
                }
                return Some(Some("continue;"));
            }
            if frame.lp.contains(to) {
                return None;
            }
            if !frame.exits.contains(&to) {
                frame.exits.push(to);
            }
            Some(Some("break;"))
        });
        match jump {
            Some(Some(text)) => {
                self.line(indent, text);
                return;
            }
            Some(None) => return,
            None => {}
        }
        if self.merges.contains(&to) {
            return;
        }
        if self.visited[to.0] {
            let start = self.function.asm.block(to).start;
            self.line(indent, &format!("// continues at 0x{:08X}", start));
            return;
        }
        self.tasks.push(Task::Block { id: to, indent });
    }

    /// The loop's single back edge is a conditional jump out of a block that
    /// does nothing but test the condition.
    fn condition_latch(&self, lp: &Loop) -> Option<ConditionLatch> {
        let [tail] = lp.tails.as_slice() else {
            return None;
        };
        if *tail == lp.header {
            return None;
        }
        let block = self.function.asm.block(*tail);
        if block.last_instruction()?.flow() != FlowKind::ConditionalJump {
            return None;
        }
        let (exit, exits_on_branch) = match block.successors.as_slice() {
            [target, fallthrough] if *target == lp.header => (*fallthrough, false),
            [target, fallthrough] if *fallthrough == lp.header => (*target, true),
            _ => return None,
        };
        if lp.contains(exit) {
            return None;
        }
        let compare = condition_source(block);
        let (_, body) = block.instructions.split_last()?;
        let quiet = body.iter().all(|insn| {
            compare.is_some_and(|c| c.address == insn.address) || self.statement(insn).is_none()
        });
        quiet.then_some(ConditionLatch {
            tail: *tail,
            exit,
            exits_on_branch,
        })
    }

    /// `at_latch` is set when the walk reaches the loop through its
    /// condition block rather than its header.
    fn render_loop(&mut self, lp: &'a Loop, at_latch: bool, indent: usize) {
        if self.emit_addresses {
            self.line(indent, &format!("// Loop at 0x{:08X}", lp.header_address));
        }

        let Some(latch) = self.condition_latch(lp) else {
            self.line(indent, "while (true) {");
            self.enter_loop(lp, None, Vec::new(), indent, "}".to_string());
            return;
        };

        let tail = self.function.asm.block(latch.tail);
        let condition = self.condition(tail, latch.exits_on_branch);
        self.visited[latch.tail.0] = true;
        let close = if at_latch {
            self.line(indent, &format!("while ({}) {{", condition));
            "}".to_string()
        } else {
            self.line(indent, "do {");
            format!("}} while ({});", condition)
        };
        self.enter_loop(lp, Some(latch.tail), vec![latch.exit], indent, close);
    }

    fn enter_loop(
        &mut self,
        lp: &'a Loop,
        latch: Option<BlockId>,
        exits: Vec<BlockId>,
        indent: usize,
        close: String,
    ) {
        self.active_loops.push(LoopFrame { lp, exits, latch });
        self.schedule(vec![
            Task::Block {
                id: lp.header,
                indent: indent + 1,
            },
            Task::EndLoop { indent, close },
        ]);
    }

    fn end_loop(&mut self, indent: usize, close: &str) {
        let frame = self.active_loops.pop();
        self.line(indent, close);

        let exits = frame.map(|f| f.exits).unwrap_or_default();
        self.schedule(
            exits
                .into_iter()
                .map(|to| Task::Edge { to, indent })
                .collect(),
        );
    }

    fn render_plain(&mut self, block: &'a InstructionBlock, indent: usize) {
        for insn in &block.instructions {
            if let Some(text) = self.statement(insn) {
                self.line(indent, &text);
            }
        }
        if let [only] = block.successors.as_slice() {
            self.edge(*only, indent);
        }
    }

    fn render_if_else(&mut self, block: &'a InstructionBlock, ie: &IfElse, indent: usize) {
        let compare = condition_source(block);
        for insn in &block.instructions {
            let is_compare = compare.is_some_and(|c| c.address == insn.address);
            let is_branch = matches!(insn.flow(), FlowKind::ConditionalJump | FlowKind::Jump);
            if is_compare || is_branch {
                continue;
            }
            if let Some(text) = self.statement(insn) {
                self.line(indent, &text);
            }
        }

        if let Some(merge) = ie.merge {
            self.merges.push(merge);
        }
        let mut tasks = Vec::new();
        if ie.is_if_not_then() {
            let condition = self.condition(block, true);
            self.line(indent, &format!("if ({}) {{", condition));
            tasks.push(Task::Edge {
                to: ie.else_block,
                indent: indent + 1,
            });
        } else if ie.is_if_then() {
            let condition = self.condition(block, false);
            self.line(indent, &format!("if ({}) {{", condition));
            tasks.push(Task::Edge {
                to: ie.then_block,
                indent: indent + 1,
            });
        } else {
            let condition = self.condition(block, false);
            self.line(indent, &format!("if ({}) {{", condition));
            tasks.push(Task::Edge {
                to: ie.then_block,
                indent: indent + 1,
            });
            tasks.push(Task::line(indent, "} else {"));
            tasks.push(Task::Edge {
                to: ie.else_block,
                indent: indent + 1,
            });
        }
        tasks.push(Task::line(indent, "}"));
        if let Some(merge) = ie.merge {
            tasks.push(Task::PopMerge);
            tasks.push(Task::Edge { to: merge, indent });
        }
        self.schedule(tasks);
    }

    fn render_switch(&mut self, block: &'a InstructionBlock, sw: &Switch, indent: usize) {
        let mut selector = String::from("/* switch expression */");
        for insn in &block.instructions {
            if insn.mnemonic == Mnemonic::Jmp {
                if let Some(Operand::Memory(memory)) = insn.operands.first() {
                    if let Addressing::ScaledIndex { index, .. } = memory.addressing {
                        selector = index.to_string();
                    }
                }
                continue;
            }
            if let Some(text) = self.statement(insn) {
                self.line(indent, &text);
            }
        }

        self.line(indent, &format!("switch ({}) {{", selector));
        let mut tasks = Vec::new();
        for case in &sw.cases {
            tasks.push(Task::line(indent + 1, format!("case {}:", case.value)));
            tasks.push(Task::Edge {
                to: case.target,
                indent: indent + 2,
            });
            tasks.push(Task::line(indent + 2, "break;"));
        }
        tasks.push(Task::line(indent + 1, "default:"));
        tasks.push(Task::line(indent + 2, "break;"));
        tasks.push(Task::line(indent, "}"));
        self.schedule(tasks);
    }

    /// C expression for an operand.
    fn expr(&self, operand: &Operand) -> String {
        match operand {
            Operand::Register { register, width } => register.name(*width).to_string(),
            Operand::Immediate { value, .. } => constant(*value),
            Operand::Memory(memory) => {
                if let Some(var) = memory
                    .frame_offset()
                    .and_then(|offset| self.function.variable_at(offset))
                {
                    return var.name.clone();
                }
                format!("*({})", address_expr(&memory.expression()))
            }
            Operand::RelativeOffset { target } => self.symbol(*target as Address),
            Operand::FpuRegister(register) => register.to_string(),
        }
    }

    fn symbol(&self, address: Address) -> String {
        self.symbols
            .and_then(|symbols| symbols.get(&address))
            .cloned()
            .unwrap_or_else(|| format!("func_{:08X}", address))
    }

    /// Translate one instruction; `None` for frame setup and branches.
    fn statement(&self, insn: &Instruction) -> Option<String> {
        use Mnemonic::*;

        if is_frame_instruction(insn) {
            return None;
        }
        let ops = &insn.operands;
        let d = ops.first().map(|o| self.expr(o));
        let s = ops.get(1).map(|o| self.expr(o));
        let src_is_one = ops.get(1).and_then(|o| o.as_immediate()) == Some(1);

        let text = match (insn.mnemonic, d, s) {
            (Nop, ..) | (Jcc(_), ..) | (Jecxz, ..) | (Loop, ..) | (Loope, ..) | (Loopne, ..) => {
                return None
            }
            (Jmp, ..) if insn.branch_target().is_some() => return None,
            (Mov | Movzx | Movsx, Some(d), Some(s)) => format!("{} = {};", d, s),
            (Lea, Some(d), Some(_)) => {
                let memory = ops[1].as_memory()?;
                match memory
                    .frame_offset()
                    .and_then(|offset| self.function.variable_at(offset))
                {
                    Some(var) => format!("{} = &{};", d, var.name),
                    None => format!("{} = {};", d, address_expr(&memory.expression())),
                }
            }
            (Xor, Some(d), Some(_)) if ops[0] == ops[1] => format!("{} = 0x00;", d),
            (Add, Some(d), Some(_)) if src_is_one => format!("{}++;", d),
            (Sub, Some(d), Some(_)) if src_is_one => format!("{}--;", d),
            (Add, Some(d), Some(s)) => format!("{} += {};", d, s),
            (Sub, Some(d), Some(s)) => format!("{} -= {};", d, s),
            (And, Some(d), Some(s)) => format!("{} &= {};", d, s),
            (Or, Some(d), Some(s)) => format!("{} |= {};", d, s),
            (Xor, Some(d), Some(s)) => format!("{} ^= {};", d, s),
            (Shl, Some(d), Some(s)) => format!("{} <<= {};", d, s),
            (Shr | Sar, Some(d), Some(s)) => format!("{} >>= {};", d, s),
            (Imul, Some(d), Some(s)) if ops.len() == 2 => format!("{} *= {};", d, s),
            (Imul, Some(d), Some(s)) if ops.len() == 3 => {
                format!("{} = {} * {};", d, s, self.expr(&ops[2]))
            }
            (Inc, Some(d), _) => format!("{}++;", d),
            (Dec, Some(d), _) => format!("{}--;", d),
            (Neg, Some(d), _) => format!("{} = -{};", d, d),
            (Not, Some(d), _) => format!("{} = ~{};", d, d),
            (Pop, Some(d), _) => format!("{} = pop();", d),
            (Call, Some(target), _) => match ops[0] {
                Operand::RelativeOffset { .. } | Operand::Register { .. } => {
                    format!("eax = {}();", target)
                }
                _ => format!("eax = ({})();", target),
            },
            (Ret | Retf | Iret, ..) => {
                if self.function.return_type == DataType::Int {
                    "return eax;".to_string()
                } else {
                    "return;".to_string()
                }
            }
            _ => format!("// {}", insn.assembly()),
        };
        Some(text)
    }

    /// Condition under which the block's conditional jump is taken, or not
    /// taken when `negate` is set.
    fn condition(&self, block: &InstructionBlock, negate: bool) -> String {
        let Some(last) = block.last_instruction() else {
            return "true".to_string();
        };
        let code = match last.mnemonic {
            Mnemonic::Jcc(code) if negate => code.negate(),
            Mnemonic::Jcc(code) => code,
            Mnemonic::Jecxz => return format!("ecx {} 0x00", if negate { "!=" } else { "==" }),
            Mnemonic::Loop => return format!("--ecx {} 0x00", if negate { "==" } else { "!=" }),
            other => {
                let text = format!("/* {} */", other.name());
                return if negate { format!("!{}", text) } else { text };
            }
        };

        let Some(source) = condition_source(block) else {
            return format!("/* {} */", Mnemonic::Jcc(code).name());
        };
        let a = self.expr(&source.operands[0]);
        let b = self.expr(&source.operands[1]);

        if source.mnemonic == Mnemonic::Cmp {
            if let Some(op) = code.operator() {
                return format!("{} {} {}", a, op, b);
            }
            if code == Condition::Sign || code == Condition::NotSign {
                let op = if code == Condition::Sign { "<" } else { ">=" };
                return format!("{} - {} {} 0x00", a, b, op);
            }
        } else if source.operands[0] == source.operands[1] {
            let op = match code {
                Condition::Sign => Some("<"),
                Condition::NotSign => Some(">="),
                // test clears CF and OF
                Condition::Below | Condition::Overflow => return "false".to_string(),
                Condition::AboveOrEqual | Condition::NotOverflow => return "true".to_string(),
                Condition::BelowOrEqual => Some("=="),
                Condition::Above => Some("!="),
                other => other.operator(),
            };
            if let Some(op) = op {
                return format!("{} {} 0x00", a, op);
            }
        } else {
            match code {
                Condition::Zero => return format!("({} & {}) == 0x00", a, b),
                Condition::NotZero => return format!("({} & {}) != 0x00", a, b),
                _ => {}
            }
        }
        format!("/* {} */", Mnemonic::Jcc(code).name())
    }
}

/// The `cmp`/`test` nearest before the block's final branch.
fn condition_source(block: &InstructionBlock) -> Option<&Instruction> {
    let (_, body) = block.instructions.split_last()?;
    body.iter()
        .rev()
        .find(|i| matches!(i.mnemonic, Mnemonic::Cmp | Mnemonic::Test) && i.operands.len() == 2)
}

/// `0x00`, `0xFF`, `0x1234`: at least two digits.
fn constant(value: u32) -> String {
    if value < 256 {
        format!("0x{:02X}", value)
    } else {
        format!("0x{:X}", value)
    }
}

/// Strip the brackets from a memory expression.
fn address_expr(expression: &str) -> &str {
    expression.trim_start_matches('[').trim_end_matches(']')
}
