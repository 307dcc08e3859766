//! File header and program header table reading.

use std::io::{ErrorKind, Read, Seek, SeekFrom};

use tracing::debug;

use crate::constants::*;
use crate::header::{FileHeader, SegmentDescriptor};
use crate::{ElfError, Result};

/// Checks applied to the identification bytes before the header is trusted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Validation {
    /// Trust the header fields as read.
    #[default]
    None,
    /// Require the ELF magic, 32-bit class and little-endian encoding.
    Strict,
}

/// Read the fixed-size file header from offset 0.
///
/// # Errors
///
/// Returns `TruncatedHeader` if the source holds fewer than `EHDR_SIZE`
/// bytes, or an identification error under `Validation::Strict`.
pub fn read_header<R: Read + Seek>(reader: &mut R, validation: Validation) -> Result<FileHeader> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(ElfError::HeaderRead)?;

    let mut data = [0u8; EHDR_SIZE];
    reader.read_exact(&mut data).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            ElfError::TruncatedHeader {
                expected: EHDR_SIZE,
            }
        } else {
            ElfError::HeaderRead(e)
        }
    })?;

    let header = FileHeader::decode(&data);
    if validation == Validation::Strict {
        check_identification(&header)?;
    }

    debug!(
        entry = format_args!("{:#x}", header.entry_address),
        phoff = format_args!("{:#x}", header.program_header_offset),
        phentsize = header.program_header_entry_size,
        phnum = header.program_header_count,
        "read file header"
    );
    Ok(header)
}

fn check_identification(header: &FileHeader) -> Result<()> {
    if !header.has_magic() {
        return Err(ElfError::InvalidMagic);
    }
    if header.class() != ELF_CLASS_32 {
        return Err(ElfError::UnsupportedClass(header.class()));
    }
    if header.data_encoding() != ELF_DATA_LSB {
        return Err(ElfError::NotLittleEndian);
    }
    Ok(())
}

/// Read the program header table described by `header`.
///
/// The table is read in one piece and split using the header's entry size
/// as the stride. Bytes of an entry past the known fields are ignored.
///
/// # Errors
///
/// Returns an error if the seek fails, the table is shorter than
/// `entry_size * count` bytes, or the entry size cannot hold a descriptor.
pub fn read_segments<R: Read + Seek>(
    reader: &mut R,
    header: &FileHeader,
) -> Result<Vec<SegmentDescriptor>> {
    let entry_size = header.program_header_entry_size;
    let count = header.program_header_count;
    let offset = header.program_header_offset;

    if count > 0 && usize::from(entry_size) < PHDR_SIZE {
        return Err(ElfError::EntryTooSmall(entry_size));
    }
    let too_large = || ElfError::TableTooLarge { entry_size, count };
    let table_size = usize::from(entry_size)
        .checked_mul(usize::from(count))
        .ok_or_else(too_large)?;
    let limit = u64::try_from(table_size).map_err(|_| too_large())?;

    reader
        .seek(SeekFrom::Start(u64::from(offset)))
        .map_err(|source| ElfError::TableSeek { offset, source })?;

    // Bounded by what the file actually holds, so a bogus count cannot
    // force a huge allocation.
    let mut table = Vec::new();
    let actual = reader
        .by_ref()
        .take(limit)
        .read_to_end(&mut table)
        .map_err(ElfError::TableRead)?;
    if actual != table_size {
        return Err(ElfError::TruncatedTable {
            offset,
            expected: table_size,
            actual,
        });
    }
    if table_size == 0 {
        return Ok(Vec::new());
    }

    table
        .chunks_exact(usize::from(entry_size))
        .map(|entry| {
            let fields = <&[u8; PHDR_SIZE]>::try_from(&entry[..PHDR_SIZE])
                .map_err(|_| ElfError::EntryTooSmall(entry_size))?;
            Ok(SegmentDescriptor::decode(fields))
        })
        .collect()
}
