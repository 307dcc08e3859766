//! ELF32 constants.

// Identification
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ELF_CLASS_32: u8 = 1;
pub const ELF_CLASS_64: u8 = 2;
pub const ELF_DATA_LSB: u8 = 1;
pub const EI_NIDENT: usize = 16;

// Record sizes
pub const EHDR_SIZE: usize = 52;
pub const PHDR_SIZE: usize = 32;

// Program header types
pub const PT_LOAD: u32 = 1;
pub const PT_NOTE: u32 = 4;
pub const PT_GNU_STACK: u32 = 0x6474_E551;

// Program header flags
pub const PF_X: u32 = 0x1; // Execute
pub const PF_W: u32 = 0x2; // Write
pub const PF_R: u32 = 0x4; // Read

pub const ET_EXEC: u16 = 2;
pub const EM_386: u16 = 3;
