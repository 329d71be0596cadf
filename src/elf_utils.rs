//! Guest-code input for the drivers: raw ARM64 images or ELF executables.

use std::path::Path;

use elf::endian::AnyEndian;
use elf::parse::ParseError;
use elf::section::SectionHeader;
use elf::ElfBytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("could not read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse ELF file: {0}")]
    Parse(#[from] ParseError),
    #[error("ELF file has no .text section")]
    MissingText,
    #[error("unexpected compression in .text section")]
    CompressedText,
}

/// Read the guest instruction stream from a file. An ELF input contributes
/// its .text section; anything else is taken as a raw little-endian image.
/// Trailing bytes that do not fill a whole word are dropped.
pub fn read_code(path: &Path) -> Result<Vec<u32>, LoadError> {
    let file_data = std::fs::read(path)?;
    if file_data.starts_with(&[0x7F, b'E', b'L', b'F']) {
        read_text_words(&file_data)
    } else {
        Ok(to_words(&file_data))
    }
}

/// Extract the .text section of an ELF image as a stream of 32-bit words.
fn read_text_words(file_data: &[u8]) -> Result<Vec<u32>, LoadError> {
    let file = ElfBytes::<AnyEndian>::minimal_parse(file_data)?;

    let text_shdr: SectionHeader = file
        .section_header_by_name(".text")?
        .ok_or(LoadError::MissingText)?;

    let (data, compression) = file.section_data(&text_shdr)?;
    if compression.is_some() {
        return Err(LoadError::CompressedText);
    }
    Ok(to_words(data))
}

fn to_words(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
