//! Recovered high-level function model.

use std::fmt;

use crate::operand::Register;
use crate::{Address, AsmFunction};

/// Inferred value type. Refinement only moves away from `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    #[default]
    Unknown,
    Void,
    Int,
    Float,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Unknown => "unknown",
            DataType::Void => "void",
            DataType::Int => "int",
            DataType::Float => "float",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Caller cleans the stack.
    #[default]
    Cdecl,
    /// Callee cleans the stack with `ret imm16`.
    Stdcall,
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::Cdecl => write!(f, "cdecl"),
            CallingConvention::Stdcall => write!(f, "stdcall"),
        }
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Local at a negative frame-pointer offset.
    Stack(i32),
    /// Argument at a positive frame-pointer offset.
    Parameter(i32),
    Register(Register),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub storage: Storage,
    /// Size in bytes
    pub size: u32,
    pub data_type: DataType,
}

impl Variable {
    pub fn new(name: impl Into<String>, storage: Storage) -> Self {
        Self {
            name: name.into(),
            storage,
            size: 4,
            data_type: DataType::Unknown,
        }
    }

    /// Frame-pointer offset for stack-resident variables.
    pub fn frame_offset(&self) -> Option<i32> {
        match self.storage {
            Storage::Stack(offset) | Storage::Parameter(offset) => Some(offset),
            Storage::Register(_) => None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Move the type away from `Unknown`; known types are kept.
    pub fn refine(&mut self, data_type: DataType) {
        if self.data_type == DataType::Unknown {
            self.data_type = data_type;
        }
    }

    /// Grow to cover an access of `size` bytes; never shrinks.
    pub fn widen(&mut self, size: u32) {
        self.size = self.size.max(size);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.data_type, self.name)
    }
}

/// Frame established by `push ebp; mov ebp, esp [; sub esp, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Address of the `push ebp`
    pub prologue: Address,
    /// Bytes reserved by the `sub esp, n`, zero when absent
    pub locals_size: u32,
}

/// A decompiled function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub address: Address,
    pub return_type: DataType,
    /// Parameters in stack order, `param_1` at `[ebp+0x08]`
    pub parameters: Vec<Variable>,
    /// Locals in order of first sighting
    pub locals: Vec<Variable>,
    pub register_variables: Vec<Variable>,
    pub calling_convention: CallingConvention,
    pub frame: Option<StackFrame>,
    pub asm: AsmFunction,
}

impl Function {
    pub fn new(name: impl Into<String>, address: Address, asm: AsmFunction) -> Self {
        Self {
            name: name.into(),
            address,
            return_type: DataType::Void,
            parameters: Vec::new(),
            locals: Vec::new(),
            register_variables: Vec::new(),
            calling_convention: CallingConvention::Cdecl,
            frame: None,
            asm,
        }
    }

    /// `int name(unknown param_1, ...)`
    pub fn signature(&self) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} {}({})", self.return_type, self.name, params)
    }

    /// The parameter or local addressed by `[ebp+offset]`.
    pub fn variable_at(&self, offset: i32) -> Option<&Variable> {
        self.parameters
            .iter()
            .chain(self.locals.iter())
            .find(|v| v.frame_offset() == Some(offset))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnalyzerContext;

    fn empty_asm() -> AsmFunction {
        AsmFunction {
            entry: 0x1000,
            blocks: Vec::new(),
            context: AnalyzerContext::default(),
        }
    }

    #[test]
    fn test_signature() {
        let mut function = Function::new("sum", 0x1000, empty_asm());
        function.return_type = DataType::Int;
        function
            .parameters
            .push(Variable::new("param_1", Storage::Parameter(8)));
        let mut second = Variable::new("param_2", Storage::Parameter(12));
        second.refine(DataType::Int);
        function.parameters.push(second);

        assert_eq!(function.signature(), "int sum(unknown param_1, int param_2)");
        assert_eq!(function.variable_at(12).unwrap().name, "param_2");
        assert!(function.variable_at(-4).is_none());
    }

    #[test]
    fn test_refine_keeps_known_type() {
        let mut var = Variable::new("local_4", Storage::Stack(-4));
        var.refine(DataType::Float);
        var.refine(DataType::Int);
        assert_eq!(var.data_type, DataType::Float);
        assert_eq!(var.to_string(), "float local_4");
    }

    #[test]
    fn test_widen_never_shrinks() {
        let mut var = Variable::new("local_2", Storage::Stack(-2)).with_size(1);
        var.widen(2);
        var.widen(1);
        assert_eq!(var.size, 2);
    }
}
