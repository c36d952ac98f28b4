//! Disassembly strategies

use std::fmt;

use clap::ValueEnum;

use crate::{CodeBuffer, DecompileError, Decoder, Disassembly};

/// Available disassembly strategies.
#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Linear sweep disassembly
    #[default]
    Linear,
    /// Recursive descent disassembly (control flow graph)
    Recursive,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Linear => write!(f, "Linear sweep"),
            Strategy::Recursive => write!(f, "Recursive descent"),
        }
    }
}

impl Strategy {
    /// Run the selected strategy on `code` using `decoder`.
    pub fn run(
        &self,
        code: &CodeBuffer<'_>,
        decoder: &dyn Decoder,
    ) -> Result<Disassembly, DecompileError> {
        match self {
            Strategy::Linear => linear::run(code, decoder),
            Strategy::Recursive => recursive::run(code, decoder),
        }
    }

    /// Return all available strategies
    pub fn all() -> &'static [Strategy] {
        &[Strategy::Linear, Strategy::Recursive]
    }
}

pub mod linear;
pub mod recursive;
