//! ELF32 on-disk records.

use crate::constants::*;

/// Read little-endian u16 from bytes.
#[inline]
const fn read_le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Read little-endian u32 from bytes.
#[inline]
const fn read_le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
fn write_le16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn write_le32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// ELF32 file header (`Elf32_Ehdr`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub ident: [u8; EI_NIDENT],
    pub file_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry_address: u32,
    pub program_header_offset: u32,
    pub section_header_offset: u32,
    pub flags: u32,
    pub header_size: u16,
    pub program_header_entry_size: u16,
    pub program_header_count: u16,
    pub section_header_entry_size: u16,
    pub section_header_count: u16,
    pub section_name_index: u16,
}

impl FileHeader {
    /// Decode a header from its on-disk bytes.
    #[must_use]
    pub fn decode(data: &[u8; EHDR_SIZE]) -> Self {
        let mut ident = [0u8; EI_NIDENT];
        ident.copy_from_slice(&data[..EI_NIDENT]);

        Self {
            ident,
            file_type: read_le16(data, 16),
            machine: read_le16(data, 18),
            version: read_le32(data, 20),
            entry_address: read_le32(data, 24),
            program_header_offset: read_le32(data, 28),
            section_header_offset: read_le32(data, 32),
            flags: read_le32(data, 36),
            header_size: read_le16(data, 40),
            program_header_entry_size: read_le16(data, 42),
            program_header_count: read_le16(data, 44),
            section_header_entry_size: read_le16(data, 46),
            section_header_count: read_le16(data, 48),
            section_name_index: read_le16(data, 50),
        }
    }

    /// Encode the header into its on-disk bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; EHDR_SIZE] {
        let mut data = [0u8; EHDR_SIZE];
        data[..EI_NIDENT].copy_from_slice(&self.ident);
        write_le16(&mut data, 16, self.file_type);
        write_le16(&mut data, 18, self.machine);
        write_le32(&mut data, 20, self.version);
        write_le32(&mut data, 24, self.entry_address);
        write_le32(&mut data, 28, self.program_header_offset);
        write_le32(&mut data, 32, self.section_header_offset);
        write_le32(&mut data, 36, self.flags);
        write_le16(&mut data, 40, self.header_size);
        write_le16(&mut data, 42, self.program_header_entry_size);
        write_le16(&mut data, 44, self.program_header_count);
        write_le16(&mut data, 46, self.section_header_entry_size);
        write_le16(&mut data, 48, self.section_header_count);
        write_le16(&mut data, 50, self.section_name_index);
        data
    }

    /// Header for a 32-bit little-endian x86 executable with the program
    /// header table placed right after the file header.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn executable(entry_address: u32, program_header_count: u16) -> Self {
        let mut ident = [0u8; EI_NIDENT];
        ident[..4].copy_from_slice(&ELF_MAGIC);
        ident[4] = ELF_CLASS_32;
        ident[5] = ELF_DATA_LSB;
        ident[6] = 1;

        Self {
            ident,
            file_type: ET_EXEC,
            machine: EM_386,
            version: 1,
            entry_address,
            program_header_offset: EHDR_SIZE as u32,
            header_size: EHDR_SIZE as u16,
            program_header_entry_size: PHDR_SIZE as u16,
            program_header_count,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn class(&self) -> u8 {
        self.ident[4]
    }

    #[must_use]
    pub const fn data_encoding(&self) -> u8 {
        self.ident[5]
    }

    /// Check if the identification bytes start with the ELF magic.
    #[must_use]
    pub fn has_magic(&self) -> bool {
        self.ident[..4] == ELF_MAGIC
    }
}

/// ELF32 program header (`Elf32_Phdr`).
///
/// `memory_size` is expected to be at least `file_size`; bytes past
/// `file_size` are zero in memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub segment_type: u32,
    pub file_offset: u32,
    pub virtual_address: u32,
    pub physical_address: u32,
    pub file_size: u32,
    pub memory_size: u32,
    pub flags: u32,
    pub align: u32,
}

impl SegmentDescriptor {
    /// Decode a descriptor from the first `PHDR_SIZE` bytes of a table entry.
    #[must_use]
    pub const fn decode(data: &[u8; PHDR_SIZE]) -> Self {
        Self {
            segment_type: read_le32(data, 0),
            file_offset: read_le32(data, 4),
            virtual_address: read_le32(data, 8),
            physical_address: read_le32(data, 12),
            file_size: read_le32(data, 16),
            memory_size: read_le32(data, 20),
            flags: read_le32(data, 24),
            align: read_le32(data, 28),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; PHDR_SIZE] {
        let mut data = [0u8; PHDR_SIZE];
        write_le32(&mut data, 0, self.segment_type);
        write_le32(&mut data, 4, self.file_offset);
        write_le32(&mut data, 8, self.virtual_address);
        write_le32(&mut data, 12, self.physical_address);
        write_le32(&mut data, 16, self.file_size);
        write_le32(&mut data, 20, self.memory_size);
        write_le32(&mut data, 24, self.flags);
        write_le32(&mut data, 28, self.align);
        data
    }

    /// Loadable segment copying `file_size` bytes from `file_offset` to
    /// `virtual_address`.
    #[must_use]
    pub const fn load(
        virtual_address: u32,
        file_offset: u32,
        file_size: u32,
        memory_size: u32,
    ) -> Self {
        Self {
            segment_type: PT_LOAD,
            file_offset,
            virtual_address,
            physical_address: virtual_address,
            file_size,
            memory_size,
            flags: PF_R | PF_W | PF_X,
            align: 0x1000,
        }
    }

    #[must_use]
    pub const fn is_load(&self) -> bool {
        self.segment_type == PT_LOAD
    }

    /// Size of the zero-filled tail, if `memory_size >= file_size`.
    #[must_use]
    pub const fn bss_size(&self) -> Option<u32> {
        self.memory_size.checked_sub(self.file_size)
    }
}
