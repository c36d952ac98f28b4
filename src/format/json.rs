//! JSON and JSON Lines output formatters

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{successor_addresses, DisassemblyFormatter};
use crate::{Address, DecompileError, Disassembly, Instruction, InstructionBlock};

/// Serializable instruction for JSON output
#[derive(Serialize, Deserialize)]
struct InstructionJson {
    /// Address of the instruction
    address: String,
    /// Size of the instruction in bytes
    size: u8,
    /// Mnemonic, `lock ` prefix included
    mnemonic: String,
    operands: String,
    /// Bytes of the instruction as hex string
    bytes: String,
}

/// Serializable basic block for JSON output
#[derive(Serialize, Deserialize)]
struct BasicBlockJson {
    start: String,
    instructions: Vec<InstructionJson>,
    successors: Vec<String>,
    predecessors: Vec<String>,
}

/// Serializable disassembly result for JSON output
#[derive(Serialize, Deserialize)]
struct DisassemblyJson {
    base_address: String,
    /// "stream" or "cfg"
    #[serde(rename = "type")]
    disasm_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<Vec<InstructionJson>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocks: Option<Vec<BasicBlockJson>>,
}

fn hex(address: Address) -> String {
    format!("0x{:08X}", address)
}

fn json_error(e: serde_json::Error) -> DecompileError {
    DecompileError::Generic(format!("JSON serialization error: {}", e))
}

impl DisassemblyFormatter for super::JsonFormatter {
    fn format(
        &self,
        disassembly: &Disassembly,
        base_addr: Address,
    ) -> Result<String, DecompileError> {
        let result = match disassembly {
            Disassembly::Stream(insns) => DisassemblyJson {
                base_address: hex(base_addr),
                disasm_type: "stream".to_string(),
                instructions: Some(insns.iter().map(instruction_to_json).collect()),
                blocks: None,
            },
            Disassembly::Cfg(blocks) => DisassemblyJson {
                base_address: hex(base_addr),
                disasm_type: "cfg".to_string(),
                instructions: None,
                blocks: Some(blocks.iter().map(|b| block_to_json(blocks, b)).collect()),
            },
        };

        serde_json::to_string_pretty(&result).map_err(json_error)
    }
}

impl DisassemblyFormatter for super::JsonLinesFormatter {
    fn format(
        &self,
        disassembly: &Disassembly,
        base_addr: Address,
    ) -> Result<String, DecompileError> {
        let mut output = String::new();
        let mut push = |value: Value| -> Result<(), DecompileError> {
            output.push_str(&serde_json::to_string(&value).map_err(json_error)?);
            output.push('\n');
            Ok(())
        };

        match disassembly {
            Disassembly::Stream(insns) => {
                for insn in insns {
                    push(instruction_line(insn, base_addr, None))?;
                }
            }
            Disassembly::Cfg(blocks) => {
                for block in blocks {
                    push(json!({
                        "type": "block",
                        "base_address": hex(base_addr),
                        "start": hex(block.start),
                        "successors": successor_addresses(blocks, block)
                            .into_iter()
                            .map(hex)
                            .collect::<Vec<_>>(),
                    }))?;
                    for insn in &block.instructions {
                        push(instruction_line(insn, base_addr, Some(block.start)))?;
                    }
                }
            }
        }

        Ok(output)
    }
}

fn instruction_line(insn: &Instruction, base_addr: Address, block: Option<Address>) -> Value {
    let mut line = json!({
        "type": "instruction",
        "base_address": hex(base_addr),
        "address": hex(insn.address),
        "size": insn.length,
        "mnemonic": insn.mnemonic_text(),
        "operands": insn.operands_text(),
        "bytes": insn.bytes_text(),
    });
    if let Some(start) = block {
        line["block_start"] = Value::String(hex(start));
    }
    line
}

fn instruction_to_json(insn: &Instruction) -> InstructionJson {
    InstructionJson {
        address: hex(insn.address),
        size: insn.length,
        mnemonic: insn.mnemonic_text(),
        operands: insn.operands_text(),
        bytes: insn.bytes_text(),
    }
}

fn block_to_json(blocks: &[InstructionBlock], block: &InstructionBlock) -> BasicBlockJson {
    BasicBlockJson {
        start: hex(block.start),
        instructions: block.instructions.iter().map(instruction_to_json).collect(),
        successors: successor_addresses(blocks, block)
            .into_iter()
            .map(hex)
            .collect(),
        predecessors: block
            .predecessors
            .iter()
            .filter_map(|id| blocks.get(id.index()))
            .map(|pred| hex(pred.start))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tests::{test_blocks, test_stream};
    use crate::format::{JsonFormatter, JsonLinesFormatter};

    #[test]
    fn test_json_cfg() {
        let text = JsonFormatter
            .format(&Disassembly::Cfg(test_blocks()), 0x1000)
            .unwrap();
        let parsed: DisassemblyJson = serde_json::from_str(&text).unwrap();

        assert_eq!(parsed.disasm_type, "cfg");
        assert!(parsed.instructions.is_none());
        let blocks = parsed.blocks.unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].successors, vec!["0x00001003"]);
        assert_eq!(blocks[1].predecessors, vec!["0x00001000"]);
        assert_eq!(blocks[0].instructions[1].operands, "ebp, esp");
        assert_eq!(blocks[0].instructions[1].bytes, "89 E5");
    }

    #[test]
    fn test_json_stream_omits_blocks() {
        let text = JsonFormatter.format(&test_stream(), 0x1000).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "stream");
        assert!(value.get("blocks").is_none());
        assert_eq!(value["instructions"][2]["mnemonic"], "ret");
    }

    #[test]
    fn test_json_lines() {
        let text = JsonLinesFormatter
            .format(&Disassembly::Cfg(test_blocks()), 0x1000)
            .unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        // block, 2 instructions, block, 1 instruction
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0]["type"], "block");
        assert_eq!(lines[0]["successors"][0], "0x00001003");
        assert_eq!(lines[2]["block_start"], "0x00001000");
        assert_eq!(lines[2]["size"], 2);
        assert_eq!(lines[4]["address"], "0x00001003");
    }
}
