use std::path::PathBuf;

use thiserror::Error;

/// Loader errors.
///
/// Every variant is fatal; the first one raised ends the load.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to open {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid executable image: {0}")]
    Format(#[from] elfrun_elf::ElfError),
    #[error("entry point address is null")]
    NullEntry,
    #[error("failed to map segment {index}: {source}")]
    Map {
        index: usize,
        #[source]
        source: elfrun_map::MapError,
    },
    #[error("failed to load segment {index}: {source}")]
    SegmentRead {
        index: usize,
        #[source]
        source: elfrun_map::FillError,
    },
    #[error("image already loaded (stage {0:?})")]
    AlreadyLoaded(crate::Stage),
}

/// Broad class of a loader error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file could not be opened.
    FileAccess,
    /// The file was opened but is not a well-formed image.
    Format,
    /// A fixed-address mapping could not be created.
    Map,
    /// Segment bytes could not be copied into their mapping.
    SegmentRead,
    /// A pipeline step was run out of order.
    Pipeline,
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::FileAccess { .. } => ErrorKind::FileAccess,
            Self::Format(_) | Self::NullEntry => ErrorKind::Format,
            Self::Map { .. } => ErrorKind::Map,
            Self::SegmentRead { .. } => ErrorKind::SegmentRead,
            Self::AlreadyLoaded(_) => ErrorKind::Pipeline,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
