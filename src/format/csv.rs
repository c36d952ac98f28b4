//! CSV output formatter

use super::DisassemblyFormatter;
use crate::{Address, DecompileError, Disassembly, Instruction};

const HEADER: [&str; 6] = [
    "block_address",
    "address",
    "size",
    "mnemonic",
    "operands",
    "bytes",
];

fn csv_error(e: impl std::fmt::Display) -> DecompileError {
    DecompileError::Generic(format!("CSV serialization error: {}", e))
}

fn write_row<W: std::io::Write>(
    writer: &mut ::csv::Writer<W>,
    block: Option<Address>,
    insn: &Instruction,
) -> Result<(), DecompileError> {
    writer
        .write_record([
            block.map(|b| format!("0x{:08X}", b)).unwrap_or_default(),
            format!("0x{:08X}", insn.address),
            insn.length.to_string(),
            insn.mnemonic_text(),
            insn.operands_text(),
            insn.bytes_text(),
        ])
        .map_err(csv_error)
}

impl DisassemblyFormatter for super::CsvFormatter {
    /// One row per instruction; `block_address` is empty for linear sweeps.
    fn format(
        &self,
        disassembly: &Disassembly,
        _base_addr: Address,
    ) -> Result<String, DecompileError> {
        let mut writer = ::csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADER).map_err(csv_error)?;

        match disassembly {
            Disassembly::Stream(insns) => {
                for insn in insns {
                    write_row(&mut writer, None, insn)?;
                }
            }
            Disassembly::Cfg(blocks) => {
                for block in blocks {
                    for insn in &block.instructions {
                        write_row(&mut writer, Some(block.start), insn)?;
                    }
                }
            }
        }

        let bytes = writer.into_inner().map_err(csv_error)?;
        String::from_utf8(bytes).map_err(csv_error)
    }
}
