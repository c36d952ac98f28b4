//! Linear-sweep disassembly strategy

use std::time::Instant;

use crate::{CodeBuffer, DecompileError, Decoder, Disassembly};

/// Linear-sweep disassembly
///
/// Decodes back to back from the first byte to the last. The sweep always
/// covers the whole buffer; undecodable bytes show up as `db` entries.
///
/// # Arguments
/// * `code` - The code bytes at their virtual base
/// * `decoder` - The decoder to use for disassembly
///
/// # Returns
/// A stream of disassembled instructions
pub fn run(code: &CodeBuffer<'_>, decoder: &dyn Decoder) -> Result<Disassembly, DecompileError> {
    log::debug!(
        "Starting linear sweep on {} bytes at 0x{:08X}",
        code.len(),
        code.base()
    );
    let start_time = Instant::now();

    let mut instructions = Vec::new();
    let mut skipped = 0usize;
    let mut at = code.base();

    while at < code.end() {
        match decoder.decode(code, at) {
            Some(insn) => {
                at = insn.next_address();
                instructions.push(insn);
            }
            None => {
                // Decoders other than the built-in one may refuse a byte
                skipped += 1;
                at += 1;
            }
        }
    }

    log::debug!(
        "Linear sweep complete: {} instructions, {} bytes skipped in {:.2?}",
        instructions.len(),
        skipped,
        start_time.elapsed()
    );

    Ok(Disassembly::Stream(instructions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::X86Decoder;
    use crate::instruction::Mnemonic;

    #[test]
    fn test_linear_covers_whole_buffer() {
        // mov eax, 1; two unclaimed 0F escapes; ret
        let bytes = [0xB8, 0x01, 0x00, 0x00, 0x00, 0x0F, 0x0F, 0xC3];
        let code = CodeBuffer::new(&bytes, 0x401000);
        let Disassembly::Stream(insns) = run(&code, &X86Decoder::new()).unwrap() else {
            panic!("Expected Stream disassembly");
        };
        let mnemonics: Vec<&str> = insns.iter().map(|i| i.mnemonic.name()).collect();
        assert_eq!(mnemonics, vec!["mov", "db", "db", "ret"]);
        assert_eq!(insns[0].address, 0x401000);
        assert_eq!(insns[3].address, 0x401007);
        assert_eq!(insns[3].mnemonic, Mnemonic::Ret);
    }

    #[test]
    fn test_linear_empty_buffer() {
        let code = CodeBuffer::new(&[], 0);
        let result = run(&code, &X86Decoder::new()).unwrap();
        assert_eq!(result.instruction_count(), 0);
    }
}
