//! ELF32 header and program header table reader.
//!
//! Reads the fixed-size file header and the program header table from any
//! `Read + Seek` source. Field values are trusted as-is unless strict
//! validation is requested.

mod builder;
mod constants;
mod header;
mod reader;

pub use builder::ImageBuilder;
pub use constants::*;
pub use header::*;
pub use reader::*;

use thiserror::Error;

/// ELF reading errors.
///
/// Every variant means the file was reachable but its content is not a
/// well-formed image.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("file header truncated: expected {expected} bytes")]
    TruncatedHeader { expected: usize },
    #[error("failed to read file header: {0}")]
    HeaderRead(#[source] std::io::Error),
    #[error("failed to seek to program header table at {offset:#x}: {source}")]
    TableSeek {
        offset: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("program header table truncated: expected {expected} bytes at {offset:#x}, got {actual}")]
    TruncatedTable {
        offset: u32,
        expected: usize,
        actual: usize,
    },
    #[error("failed to read program header table: {0}")]
    TableRead(#[source] std::io::Error),
    #[error("program header table too large: {count} entries of {entry_size} bytes")]
    TableTooLarge { entry_size: u16, count: u16 },
    #[error("program header entry size {0} is smaller than {PHDR_SIZE} bytes")]
    EntryTooSmall(u16),
    #[error("invalid ELF magic number")]
    InvalidMagic,
    #[error("unsupported ELF class: {0}")]
    UnsupportedClass(u8),
    #[error("only little-endian ELF supported")]
    NotLittleEndian,
}

pub type Result<T> = std::result::Result<T, ElfError>;
