//! elfrun - minimal ELF32 program loader
//!
//! Maps the `PT_LOAD` segments of a statically linked 32-bit executable at
//! their fixed virtual addresses inside the current process, then calls the
//! entry point as a function and reports the `i32` it returns.
//!
//! # Example
//!
//! ```ignore
//! use elfrun::{LoadOptions, run};
//!
//! let report = unsafe { run("fib".as_ref(), &LoadOptions::default())? };
//! println!("{}", report.value);
//! ```

// Re-export from sub-crates
pub use elfrun_elf::{ElfError, FileHeader, SegmentDescriptor, Validation};
pub use elfrun_map::{FillError, MapError, MapPolicy, MappedSegment};

mod dispatch;
mod error;
mod loader;

pub use dispatch::{EntryFn, EntryPoint, dispatch};
pub use error::{Error, ErrorKind, Result};
pub use loader::{LoadOptions, LoadedImage, LoaderState, RunReport, Stage, load, run};
