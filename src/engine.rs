//! Decompilation pipeline and function cache.

use std::collections::HashMap;

use crate::analysis::{dataflow, loops, structure, variables};
use crate::config::DecompilerConfig;
use crate::decoder::X86Decoder;
use crate::pseudocode::PseudocodeGenerator;
use crate::strategy::recursive;
use crate::types::Function;
use crate::{Address, CodeImage, DecompileError};

/// Outcome of decompiling every export.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Entry addresses decompiled successfully, in export-table order
    pub decompiled: Vec<Address>,
    /// `(export name, address, error)` for every export that failed
    pub failures: Vec<(String, Address, String)>,
}

/// Runs the analysis pipeline over a loaded image and caches the results.
pub struct Decompiler {
    image: CodeImage,
    config: DecompilerConfig,
    decoder: X86Decoder,
    functions: HashMap<Address, Function>,
    /// Export names by address, also used to name call targets.
    symbols: HashMap<Address, String>,
}

impl Decompiler {
    pub fn new(image: CodeImage, config: DecompilerConfig) -> Self {
        let symbols = image
            .exports
            .iter()
            .filter(|e| !e.is_forwarder)
            .map(|e| (e.address, e.name.clone()))
            .collect();
        Self {
            image,
            config,
            decoder: X86Decoder::new(),
            functions: HashMap::new(),
            symbols,
        }
    }

    pub fn image(&self) -> &CodeImage {
        &self.image
    }

    pub fn config(&self) -> &DecompilerConfig {
        &self.config
    }

    /// Decompile the function entered at `address`.
    ///
    /// Results are cached; asking again for the same address returns the
    /// stored function without re-running the pipeline.
    pub fn decompile_function(&mut self, address: Address) -> Result<&Function, DecompileError> {
        if !self.functions.contains_key(&address) {
            let function = self.run_pipeline(address)?;
            self.functions.insert(address, function);
        }
        self.functions
            .get(&address)
            .ok_or(DecompileError::NoCodeSection(address))
    }

    /// Decompile the export called `name`.
    pub fn decompile_export(&mut self, name: &str) -> Result<&Function, DecompileError> {
        let address = self
            .image
            .exports
            .iter()
            .find(|e| e.name == name && !e.is_forwarder)
            .map(|e| e.address)
            .ok_or_else(|| DecompileError::ExportNotFound(name.to_string()))?;
        self.decompile_function(address)
    }

    /// Decompile the function at `address` and render it.
    pub fn decompile_to_pseudocode(&mut self, address: Address) -> Result<String, DecompileError> {
        self.decompile_function(address)?;
        let function = self
            .functions
            .get(&address)
            .ok_or(DecompileError::NoCodeSection(address))?;
        Ok(self.pseudocode(function))
    }

    /// Render an already decompiled function.
    pub fn pseudocode(&self, function: &Function) -> String {
        PseudocodeGenerator::new(function)
            .with_symbols(&self.symbols)
            .emit_addresses(self.config.emit_addresses)
            .generate()
    }

    pub fn is_cached(&self, address: Address) -> bool {
        self.functions.contains_key(&address)
    }

    /// Cached function at `address`, if it was decompiled before.
    pub fn cached(&self, address: Address) -> Option<&Function> {
        self.functions.get(&address)
    }

    /// Decompile every non-forwarder export; failures are logged and skipped.
    pub fn decompile_all_exported_functions(&mut self) -> BatchReport {
        let exports: Vec<(String, Address)> = self
            .image
            .exports
            .iter()
            .filter(|e| !e.is_forwarder)
            .map(|e| (e.name.clone(), e.address))
            .collect();
        log::debug!("Decompiling {} exported functions", exports.len());

        let mut report = BatchReport::default();
        for (name, address) in exports {
            match self.decompile_function(address) {
                Ok(_) => report.decompiled.push(address),
                Err(e) => {
                    log::warn!("Failed to decompile {} at 0x{:08X}: {}", name, address, e);
                    report.failures.push((name, address, e.to_string()));
                }
            }
        }
        report
    }

    fn function_name(&self, address: Address) -> String {
        self.symbols
            .get(&address)
            .cloned()
            .unwrap_or_else(|| format!("func_{:08X}", address))
    }

    /// CFG, loops, data flow, variables, structures: in that order.
    fn run_pipeline(&self, address: Address) -> Result<Function, DecompileError> {
        let section = self
            .image
            .section_containing(address)
            .ok_or(DecompileError::NoCodeSection(address))?;
        log::debug!(
            "Decompiling 0x{:08X} in section {}",
            address,
            section.name
        );

        let code = section.code();
        let mut asm = recursive::build(&code, &self.decoder, address, &self.config)?;
        asm.context.loops = loops::analyze(&asm);
        asm.context.registers = dataflow::analyze(&asm);

        let mut function = Function::new(self.function_name(address), address, asm);
        variables::analyze(&mut function);
        function.asm.context.structures = structure::analyze(&function.asm);
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodeSection, ExportedSymbol};

    fn image() -> CodeImage {
        let mut image = CodeImage::from_raw(
            vec![
                0x55, 0x89, 0xE5, 0x8B, 0x45, 0x08, 0x5D, 0xC3, // 401000: return param_1
                0x31, 0xC0, 0xC3, // 401008: xor eax, eax; ret
            ],
            0x401000,
        );
        image.exports = vec![
            ExportedSymbol {
                name: "First".into(),
                address: 0x401000,
                is_forwarder: false,
            },
            ExportedSymbol {
                name: "Zero".into(),
                address: 0x401008,
                is_forwarder: false,
            },
            ExportedSymbol {
                name: "Forwarded".into(),
                address: 0x500000,
                is_forwarder: true,
            },
        ];
        image
    }

    #[test]
    fn test_decompile_function_is_cached() {
        let mut decompiler = Decompiler::new(image(), DecompilerConfig::default());
        assert!(!decompiler.is_cached(0x401000));

        let function = decompiler.decompile_function(0x401000).unwrap();
        assert_eq!(function.name, "First");
        assert_eq!(function.parameters.len(), 1);
        assert!(decompiler.is_cached(0x401000));

        let again = decompiler.decompile_function(0x401000).unwrap();
        assert_eq!(again.signature(), "int First(unknown param_1)");
    }

    #[test]
    fn test_unnamed_function() {
        let mut decompiler = Decompiler::new(image(), DecompilerConfig::default());
        let text = decompiler.decompile_to_pseudocode(0x401003).unwrap();
        assert!(text.starts_with("int func_00401003()"), "{}", text);
    }

    #[test]
    fn test_missing_section() {
        let mut decompiler = Decompiler::new(image(), DecompilerConfig::default());
        let err = decompiler.decompile_function(0x300000).unwrap_err();
        assert!(matches!(err, DecompileError::NoCodeSection(0x300000)));
        assert!(!decompiler.is_cached(0x300000));
    }

    #[test]
    fn test_decompile_export_by_name() {
        let mut decompiler = Decompiler::new(image(), DecompilerConfig::default());
        assert_eq!(decompiler.decompile_export("Zero").unwrap().address, 0x401008);
        assert!(matches!(
            decompiler.decompile_export("Forwarded"),
            Err(DecompileError::ExportNotFound(_))
        ));
    }

    #[test]
    fn test_batch_skips_forwarders_and_reports_failures() {
        let mut image = image();
        image.exports.push(ExportedSymbol {
            name: "Data".into(),
            address: 0x402000,
            is_forwarder: false,
        });
        image
            .sections
            .push(CodeSection::new(".data", 0x402000, vec![0; 16], false));

        let mut decompiler = Decompiler::new(image, DecompilerConfig::default());
        let report = decompiler.decompile_all_exported_functions();
        assert_eq!(report.decompiled, vec![0x401000, 0x401008]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "Data");
        assert_eq!(report.failures[0].1, 0x402000);
        assert!(decompiler.is_cached(0x401008));
    }
}
