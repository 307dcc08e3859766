//! Fixed-address mappings for loadable ELF32 segments.
//!
//! Each `PT_LOAD` descriptor becomes an anonymous, read/write/execute mapping
//! placed exactly at the descriptor's virtual address, then filled from the
//! file. Mappings are never unmapped here: after control transfer they belong
//! to the loaded program.

mod segment;

pub use segment::{FillError, MapError, MapPolicy, MappedSegment};
