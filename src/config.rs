//! Decompiler tuning knobs.

use serde::Deserialize;

use crate::DecompileError;

/// Limits and output options for one decompiler instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecompilerConfig {
    /// Upper bound on blocks discovered per function
    pub max_blocks: usize,
    /// Upper bound on instructions decoded into one block
    pub max_block_instructions: usize,
    /// Emit `// Block at 0x...` comments in pseudocode
    pub emit_addresses: bool,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            max_blocks: 10_000,
            max_block_instructions: 100_000,
            emit_addresses: true,
        }
    }
}

impl DecompilerConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, DecompileError> {
        serde_json::from_str(text)
            .map_err(|e| DecompileError::Generic(format!("Config parse error: {}", e)))
    }
}
