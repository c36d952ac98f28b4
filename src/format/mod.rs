//! Output formats for disassembly listings

mod csv;
mod json;

use clap::ValueEnum;
use std::fmt;
use std::str::FromStr;

use crate::{Address, Disassembly, DecompileError, InstructionBlock};

/// Supported output formats for disassembly results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text listing (default)
    #[default]
    Text,
    /// JSON format (hierarchical)
    Json,
    /// JSON Lines format (one JSON object per line)
    JsonLines,
    /// CSV format (comma-separated values)
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "jsonlines" => Ok(OutputFormat::JsonLines),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl OutputFormat {
    /// Get all available output formats
    pub fn available_formats() -> &'static [Self] {
        &[
            OutputFormat::Text,
            OutputFormat::Json,
            OutputFormat::JsonLines,
            OutputFormat::Csv,
        ]
    }

    /// Get a formatter for this output format
    pub fn get_formatter(&self) -> Box<dyn DisassemblyFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::JsonLines => Box::new(JsonLinesFormatter),
            OutputFormat::Csv => Box::new(CsvFormatter),
        }
    }
}

/// Formatter trait for disassembly output
pub trait DisassemblyFormatter {
    /// Format a disassembly result
    fn format(&self, disassembly: &Disassembly, base_addr: Address)
        -> Result<String, DecompileError>;
}

/// Format disassembly in plain text
pub struct TextFormatter;

/// Format disassembly in JSON
pub struct JsonFormatter;

/// Format disassembly in JSON Lines
pub struct JsonLinesFormatter;

/// Format disassembly in CSV
pub struct CsvFormatter;

/// Start addresses of a block's successors. Ids index into `blocks`.
fn successor_addresses(blocks: &[InstructionBlock], block: &InstructionBlock) -> Vec<Address> {
    block
        .successors
        .iter()
        .filter_map(|id| blocks.get(id.index()))
        .map(|succ| succ.start)
        .collect()
}

impl DisassemblyFormatter for TextFormatter {
    fn format(
        &self,
        disassembly: &Disassembly,
        base_addr: Address,
    ) -> Result<String, DecompileError> {
        let mut output = String::new();

        match disassembly {
            Disassembly::Stream(insns) => {
                output.push_str(&format!("Disassembly at 0x{:08X}:\n\n", base_addr));
                for insn in insns {
                    output.push_str(&format!("{}\n", insn));
                }
            }
            Disassembly::Cfg(blocks) => {
                output.push_str(&format!("Control Flow Graph at 0x{:08X}:\n\n", base_addr));

                for block in blocks {
                    output.push_str(&format!("Block at 0x{:08X}:\n", block.start));
                    for insn in &block.instructions {
                        output.push_str(&format!("  {}\n", insn));
                    }

                    let succs = successor_addresses(blocks, block);
                    if succs.is_empty() {
                        output.push_str("  No successors (terminal block)\n");
                    } else {
                        let list = succs
                            .iter()
                            .map(|a| format!("0x{:08X}", a))
                            .collect::<Vec<_>>()
                            .join(", ");
                        output.push_str(&format!("  Successors: {}\n", list));
                    }
                    output.push('\n');
                }
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decoder::decode_all;
    use crate::BlockId;

    /// push ebp; mov ebp, esp | ret
    pub(crate) fn test_blocks() -> Vec<InstructionBlock> {
        let insns = decode_all(&[0x55, 0x89, 0xE5, 0xC3], 0x1000);

        let mut first = InstructionBlock::new(BlockId(0), 0x1000);
        first.instructions = insns[..2].to_vec();
        first.successors = vec![BlockId(1)];

        let mut second = InstructionBlock::new(BlockId(1), 0x1003);
        second.instructions = insns[2..].to_vec();
        second.predecessors = vec![BlockId(0)];

        vec![first, second]
    }

    pub(crate) fn test_stream() -> Disassembly {
        Disassembly::Stream(decode_all(&[0x55, 0x89, 0xE5, 0xC3], 0x1000))
    }

    #[test]
    fn test_text_formatter_stream() {
        let result = TextFormatter.format(&test_stream(), 0x1000).unwrap();

        assert!(result.starts_with("Disassembly at 0x00001000:\n\n"));
        assert!(result.contains("00001000  55                        push ebp\n"));
        assert!(result.contains("00001001  89 E5                     mov ebp, esp\n"));
        assert!(result.contains("00001003  C3                        ret\n"));
    }

    #[test]
    fn test_text_formatter_cfg() {
        let disasm = Disassembly::Cfg(test_blocks());
        let result = TextFormatter.format(&disasm, 0x1000).unwrap();

        assert!(result.contains("Block at 0x00001000:"));
        assert!(result.contains("Block at 0x00001003:"));
        assert!(result.contains("  00001001  89 E5"));
        assert!(result.contains("Successors: 0x00001003"));
        assert!(result.contains("No successors (terminal block)"));
    }

    #[test]
    fn test_format_names() {
        for format in OutputFormat::available_formats() {
            let parsed: OutputFormat = format.to_string().parse().unwrap();
            assert_eq!(parsed, *format);
        }
        assert_eq!(
            "JSONLINES".parse::<OutputFormat>().unwrap(),
            OutputFormat::JsonLines
        );
        assert!("ngram".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }

    #[test]
    fn test_value_enum_names() {
        assert_eq!(
            <OutputFormat as ValueEnum>::from_str("json-lines", true).ok(),
            Some(OutputFormat::JsonLines)
        );
    }

    #[test]
    fn test_every_formatter_handles_empty_input() {
        for format in OutputFormat::available_formats() {
            let formatter = format.get_formatter();
            assert!(formatter.format(&Disassembly::Stream(Vec::new()), 0).is_ok());
            assert!(formatter.format(&Disassembly::Cfg(Vec::new()), 0).is_ok());
        }
    }
}
