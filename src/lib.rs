//! Core IR, traits and error type for the Nuclide Lift x86 decompiler.
//!
//! The crate decodes 32-bit x86 machine code, rebuilds per-function control
//! flow graphs, runs loop, data-flow, stack-frame and structure analyses over
//! them and renders approximate C-like pseudocode.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::fs;
//! use nuclide_lift::{
//!     config::DecompilerConfig,
//!     engine::Decompiler,
//!     parser::GoblinParser,
//!     BinaryParser, // Import the trait to bring parse() method into scope
//! };
//!
//! // Read and parse a 32-bit PE or ELF image
//! let binary_data = fs::read("path/to/binary").unwrap();
//! let image = GoblinParser::new().parse(&binary_data).unwrap();
//! let entry = image.entry_point.unwrap();
//!
//! // Decompile the entry point
//! let mut decompiler = Decompiler::new(image, DecompilerConfig::default());
//! let text = decompiler.decompile_to_pseudocode(entry).unwrap();
//! println!("{}", text);
//! ```

pub mod analysis;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod format;
pub mod instruction;
pub mod operand;
pub mod parser;
pub mod pseudocode;
pub mod strategy;
pub mod types;

use std::fmt;

pub use crate::analysis::AnalyzerContext;
pub use crate::instruction::{Instruction, Mnemonic};
pub use crate::operand::{Operand, Register, Width};

/// Represents an address in memory
pub type Address = u64;

/// Size of the raw byte buffer carried by every instruction.
pub const MAX_INSTRUCTION_SIZE: usize = 16;

/// A code byte range placed at its virtual address.
///
/// All lookups take virtual addresses; the buffer does the offset arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct CodeBuffer<'a> {
    bytes: &'a [u8],
    base: Address,
}

impl<'a> CodeBuffer<'a> {
    pub fn new(bytes: &'a [u8], base: Address) -> Self {
        Self { bytes, base }
    }

    /// Virtual address of the first byte.
    pub fn base(&self) -> Address {
        self.base
    }

    /// One past the last virtual address.
    pub fn end(&self) -> Address {
        self.base + self.bytes.len() as Address
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    /// Bytes from `address` to the end of the buffer.
    pub fn slice_from(&self, address: Address) -> Option<&'a [u8]> {
        if !self.contains(address) {
            return None;
        }
        Some(&self.bytes[(address - self.base) as usize..])
    }
}

/// Decoder trait: turns bytes at a virtual address into an instruction.
pub trait Decoder: Send + Sync {
    /// Decode a single instruction at virtual address `at`.
    ///
    /// # Returns
    /// `None` only when `at` lies outside `code`
    fn decode(&self, code: &CodeBuffer<'_>, at: Address) -> Option<Instruction>;
}

/// Dense index of a block inside its function, assigned in address order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One basic block of a function's CFG.
///
/// Only the final instruction may transfer control. Successors are ordered
/// jump target first, fallthrough second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionBlock {
    pub id: BlockId,
    /// Starting address of the basic block
    pub start: Address,
    pub instructions: Vec<Instruction>,
    pub successors: Vec<BlockId>,
    pub predecessors: Vec<BlockId>,
}

impl InstructionBlock {
    pub fn new(id: BlockId, start: Address) -> Self {
        Self {
            id,
            start,
            instructions: Vec::new(),
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    /// Address one past the last instruction.
    pub fn end_address(&self) -> Address {
        self.instructions
            .last()
            .map(|insn| insn.next_address())
            .unwrap_or(self.start)
    }

    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.instructions.iter().map(|i| i.length as usize).sum()
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end_address()
    }
}

/// A function's CFG plus the analysis results attached to it.
#[derive(Debug, Clone)]
pub struct AsmFunction {
    pub entry: Address,
    /// Blocks sorted by start address; `blocks[i].id == BlockId(i)`.
    pub blocks: Vec<InstructionBlock>,
    pub context: AnalyzerContext,
}

impl AsmFunction {
    pub fn block(&self, id: BlockId) -> &InstructionBlock {
        &self.blocks[id.0]
    }

    /// Block starting exactly at `address`.
    pub fn block_at(&self, address: Address) -> Option<&InstructionBlock> {
        self.blocks
            .binary_search_by_key(&address, |b| b.start)
            .ok()
            .map(|i| &self.blocks[i])
    }

    pub fn entry_block(&self) -> Option<&InstructionBlock> {
        self.block_at(self.entry)
    }

    /// Every instruction in address order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    pub fn successors(&self, id: BlockId) -> impl Iterator<Item = &InstructionBlock> {
        self.block(id).successors.iter().map(move |s| self.block(*s))
    }
}

/// Unified disassembly output.
#[derive(Debug, Clone)]
pub enum Disassembly {
    /// Linear stream of instructions
    Stream(Vec<Instruction>),
    /// Control flow graph of basic blocks, sorted by address
    Cfg(Vec<InstructionBlock>),
}

impl Disassembly {
    /// Get the total number of instructions
    pub fn instruction_count(&self) -> usize {
        match self {
            Disassembly::Stream(insns) => insns.len(),
            Disassembly::Cfg(blocks) => blocks.iter().map(|b| b.instructions.len()).sum(),
        }
    }

    /// Get all instructions as a flat vector
    pub fn all_instructions(&self) -> Vec<Instruction> {
        match self {
            Disassembly::Stream(insns) => insns.clone(),
            Disassembly::Cfg(blocks) => blocks
                .iter()
                .flat_map(|b| b.instructions.iter().cloned())
                .collect(),
        }
    }
}

/// A loaded code section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSection {
    pub name: String,
    /// Virtual address of the first byte
    pub address: Address,
    pub bytes: Vec<u8>,
    pub executable: bool,
}

impl CodeSection {
    pub fn new(name: impl Into<String>, address: Address, bytes: Vec<u8>, executable: bool) -> Self {
        Self {
            name: name.into(),
            address,
            bytes,
            executable,
        }
    }

    pub fn end_address(&self) -> Address {
        self.address + self.bytes.len() as Address
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.address && address < self.end_address()
    }

    pub fn code(&self) -> CodeBuffer<'_> {
        CodeBuffer::new(&self.bytes, self.address)
    }
}

/// An exported symbol of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSymbol {
    pub name: String,
    pub address: Address,
    /// Forwarded to another module; there is no code behind it.
    pub is_forwarder: bool,
}

/// Everything the decompiler needs from an executable container.
#[derive(Debug, Clone, Default)]
pub struct CodeImage {
    pub entry_point: Option<Address>,
    pub sections: Vec<CodeSection>,
    pub exports: Vec<ExportedSymbol>,
}

impl CodeImage {
    /// An image made of one executable buffer at `base`, without exports.
    pub fn from_raw(bytes: Vec<u8>, base: Address) -> Self {
        Self {
            entry_point: Some(base),
            sections: vec![CodeSection::new(".text", base, bytes, true)],
            exports: Vec::new(),
        }
    }

    /// The executable section containing `address`.
    pub fn section_containing(&self, address: Address) -> Option<&CodeSection> {
        self.sections
            .iter()
            .find(|s| s.executable && s.contains(address))
    }

    /// Name of the non-forwarder export at `address`, if any.
    pub fn export_name(&self, address: Address) -> Option<&str> {
        self.exports
            .iter()
            .find(|e| e.address == address && !e.is_forwarder)
            .map(|e| e.name.as_str())
    }

    pub fn executable_sections(&self) -> impl Iterator<Item = &CodeSection> {
        self.sections.iter().filter(|s| s.executable)
    }
}

/// Parser trait: turn raw container bytes into a `CodeImage`.
pub trait BinaryParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> Result<CodeImage, DecompileError>;
}

/// Error type for decoding and decompilation
#[derive(Debug, thiserror::Error)]
pub enum DecompileError {
    /// Failed to parse binary format
    #[error("Failed to parse binary format: {0}")]
    ParsingError(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// No executable section holds the requested address
    #[error("No code section contains address 0x{0:08X}")]
    NoCodeSection(Address),

    #[error("Export not found: {0}")]
    ExportNotFound(String),

    /// The decoder produced nothing at an in-bounds, reachable address
    #[error("Decoder returned no instruction at 0x{0:08X}")]
    DecodeFailed(Address),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Generic(String),
}
