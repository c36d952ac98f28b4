//! Goblin-based loader for 32-bit PE and ELF images.

use std::fmt;
use std::path::Path;

use goblin::{elf, pe, Object};

use crate::{Address, BinaryParser, CodeImage, CodeSection, DecompileError, ExportedSymbol};

/// A parser that turns PE and ELF containers into a [`CodeImage`] via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Read `path` and parse its contents.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<CodeImage, DecompileError> {
        let data = std::fs::read(path.as_ref())?;
        log::debug!(
            "Loaded {} bytes from {}",
            data.len(),
            path.as_ref().display()
        );
        self.parse(&data)
    }

    /// Parse an ELF image.
    fn parse_elf(&self, elf: elf::Elf<'_>, img: &[u8]) -> Result<CodeImage, DecompileError> {
        if elf.is_64 || elf.header.e_machine != elf::header::EM_386 {
            return Err(DecompileError::UnsupportedArchitecture(format!(
                "ELF machine {}",
                elf::header::machine_to_str(elf.header.e_machine)
            )));
        }

        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            if !sh.is_alloc() {
                continue;
            }
            let name = elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("");
            let bytes = if sh.sh_type == elf::section_header::SHT_NOBITS {
                vec![0; sh.sh_size as usize]
            } else {
                file_range(img, sh.sh_offset as usize, sh.sh_size as usize, name)?.to_vec()
            };
            sections.push(CodeSection::new(
                name,
                sh.sh_addr as Address,
                bytes,
                sh.is_executable(),
            ));
        }

        // Defined global functions, dynamic table first.
        let mut exports: Vec<ExportedSymbol> = Vec::new();
        let tables = [(&elf.dynsyms, &elf.dynstrtab), (&elf.syms, &elf.strtab)];
        for (symtab, strtab) in tables {
            for sym in symtab.iter() {
                if !sym.is_function()
                    || sym.st_bind() != elf::sym::STB_GLOBAL
                    || sym.st_shndx == elf::section_header::SHN_UNDEF as usize
                {
                    continue;
                }
                let Some(name) = strtab.get_at(sym.st_name).filter(|n| !n.is_empty()) else {
                    continue;
                };
                if exports.iter().any(|e| e.name == name) {
                    continue;
                }
                exports.push(ExportedSymbol {
                    name: name.to_string(),
                    address: sym.st_value as Address,
                    is_forwarder: false,
                });
            }
        }

        Ok(CodeImage {
            entry_point: (elf.entry != 0).then_some(elf.entry as Address),
            sections,
            exports,
        })
    }

    /// Parse a PE image. Section and export addresses are rebased onto the
    /// preferred image base.
    fn parse_pe(&self, pe: pe::PE<'_>, img: &[u8]) -> Result<CodeImage, DecompileError> {
        let machine = pe.header.coff_header.machine;
        if pe.is_64 || machine != pe::header::COFF_MACHINE_X86 {
            return Err(DecompileError::UnsupportedArchitecture(format!(
                "PE machine 0x{:04X}",
                machine
            )));
        }
        let image_base = pe.image_base as Address;

        let mut sections = Vec::new();
        for sect in &pe.sections {
            let name = sect.name().unwrap_or("");
            let raw_size = sect.size_of_raw_data as usize;
            let virtual_size = if sect.virtual_size == 0 {
                raw_size
            } else {
                sect.virtual_size as usize
            };
            let mut bytes = file_range(
                img,
                sect.pointer_to_raw_data as usize,
                raw_size.min(virtual_size),
                name,
            )?
            .to_vec();
            bytes.resize(virtual_size, 0);

            let executable =
                (sect.characteristics & pe::section_table::IMAGE_SCN_MEM_EXECUTE) != 0;
            sections.push(CodeSection::new(
                name,
                image_base + sect.virtual_address as Address,
                bytes,
                executable,
            ));
        }

        let exports = pe
            .exports
            .iter()
            .filter_map(|export| {
                let name = export.name?;
                Some(ExportedSymbol {
                    name: name.to_string(),
                    address: image_base + export.rva as Address,
                    is_forwarder: export.reexport.is_some(),
                })
            })
            .collect();

        Ok(CodeImage {
            entry_point: Some(image_base + pe.entry as Address),
            sections,
            exports,
        })
    }
}

/// Bytes `offset..offset + size` of the file, or a parse error naming `what`.
fn file_range<'a>(
    img: &'a [u8],
    offset: usize,
    size: usize,
    what: &str,
) -> Result<&'a [u8], DecompileError> {
    offset
        .checked_add(size)
        .and_then(|end| img.get(offset..end))
        .ok_or_else(|| {
            DecompileError::ParsingError(format!(
                "section {} (offset 0x{:X}, size 0x{:X}) lies outside the file",
                what, offset, size
            ))
        })
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}

impl BinaryParser for GoblinParser {
    fn parse(&self, data: &[u8]) -> Result<CodeImage, DecompileError> {
        let image = match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.parse_elf(elf, data)?,
            Ok(Object::PE(pe)) => self.parse_pe(pe, data)?,
            Ok(Object::Mach(_)) => {
                return Err(DecompileError::UnsupportedArchitecture("Mach-O".into()))
            }
            Ok(_) => return Err(DecompileError::ParsingError("Unsupported file format".into())),
            Err(e) => return Err(DecompileError::ParsingError(e.to_string())),
        };
        log::debug!(
            "Parsed image: {} sections ({} executable), {} exports",
            image.sections.len(),
            image.executable_sections().count(),
            image.exports.len()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Bare ELF32 header: no program or section headers.
    fn elf32_header(machine: u16, entry: u32) -> Vec<u8> {
        let mut bytes = vec![0x7F, b'E', b'L', b'F', 1, 1, 1, 0];
        bytes.resize(16, 0);
        bytes.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        bytes.extend_from_slice(&machine.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&entry.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // e_phoff
        bytes.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        bytes.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        bytes.extend_from_slice(&52u16.to_le_bytes());
        bytes.extend_from_slice(&32u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&40u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_minimal_elf32() {
        let image = GoblinParser::new()
            .parse(&elf32_header(elf::header::EM_386, 0x0804_8000))
            .unwrap();
        assert_eq!(image.entry_point, Some(0x0804_8000));
        assert!(image.sections.is_empty());
        assert!(image.exports.is_empty());
    }

    #[test]
    fn test_rejects_other_machines() {
        let err = GoblinParser::new()
            .parse(&elf32_header(elf::header::EM_X86_64, 0x1000))
            .unwrap_err();
        assert!(matches!(err, DecompileError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = GoblinParser::new().parse(b"not an executable").unwrap_err();
        assert!(matches!(err, DecompileError::ParsingError(_)));
    }

    #[test]
    fn test_parse_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&elf32_header(elf::header::EM_386, 0x0804_9000))
            .unwrap();
        let image = GoblinParser::new().parse_file(file.path()).unwrap();
        assert_eq!(image.entry_point, Some(0x0804_9000));
    }

    #[test]
    fn test_parse_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = GoblinParser::new()
            .parse_file(dir.path().join("missing.exe"))
            .unwrap_err();
        assert!(matches!(err, DecompileError::IoError(_)));
    }

    #[test]
    fn test_file_range_bounds() {
        let img = [0u8; 8];
        assert_eq!(file_range(&img, 4, 4, ".text").unwrap().len(), 4);
        assert!(file_range(&img, 6, 4, ".text").is_err());
        assert!(file_range(&img, usize::MAX, 2, ".text").is_err());
    }
}
