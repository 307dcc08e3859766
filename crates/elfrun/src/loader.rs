//! The load pipeline.
//!
//! `Start -> HeaderRead -> SegmentsRead -> SegmentsMapped -> Dispatched -> Done`,
//! with any error moving to `Fatal` and ending the load. Resources held along
//! the way live in [`LoaderState`] and are released when it drops, whichever
//! stage was reached.

use std::fs::File;
use std::path::{Path, PathBuf};

use elfrun_elf::{FileHeader, SegmentDescriptor, Validation, read_header, read_segments};
use elfrun_map::{MapPolicy, MappedSegment};
use tracing::{debug, info, info_span, trace};

use crate::dispatch::{EntryPoint, dispatch};
use crate::{Error, Result};

/// Pipeline progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    HeaderRead,
    SegmentsRead,
    SegmentsMapped,
    Dispatched,
    Done,
    /// An error ended the load. Terminal.
    Fatal,
}

/// Load configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Behaviour when a segment's range is already mapped.
    pub map_policy: MapPolicy,
    /// Identification checks on the file header.
    pub validation: Validation,
}

/// An image whose loadable segments are mapped and filled.
#[derive(Debug)]
pub struct LoadedImage {
    pub entry: EntryPoint,
    /// Mappings in table order. They stay mapped after this is dropped.
    pub segments: Vec<MappedSegment>,
}

/// Outcome of running an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub entry: EntryPoint,
    /// Value returned by the entry point.
    pub value: i32,
}

/// Resources held while an image is being loaded.
///
/// Dropping the state releases the descriptor table, the file header and the
/// file handle, in that order. Segment mappings are not part of it.
#[derive(Debug)]
pub struct LoaderState {
    segments: Vec<SegmentDescriptor>,
    header: Option<FileHeader>,
    file: File,
    path: PathBuf,
    stage: Stage,
}

impl LoaderState {
    /// Open `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileAccess` with the OS reason if the file cannot be
    /// opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::FileAccess {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "opened image");

        Ok(Self {
            segments: Vec::new(),
            header: None,
            file,
            path: path.to_path_buf(),
            stage: Stage::Start,
        })
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub const fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    #[must_use]
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segments
    }

    /// Read the header and program header table, then map and fill every
    /// `PT_LOAD` segment.
    ///
    /// Runs once per state: segments are never mapped twice.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLoaded` if the state is past `Stage::Start`,
    /// otherwise the first error hit, after which the state is
    /// `Stage::Fatal`. Segments mapped before the error stay mapped.
    pub fn load(&mut self, options: &LoadOptions) -> Result<LoadedImage> {
        if self.stage != Stage::Start {
            return Err(Error::AlreadyLoaded(self.stage));
        }

        let result = self.load_stages(options);
        if let Err(e) = &result {
            debug!(error = %e, after = ?self.stage, "load failed");
            self.advance(Stage::Fatal);
        }
        result
    }

    fn load_stages(&mut self, options: &LoadOptions) -> Result<LoadedImage> {
        let header = {
            let _span = info_span!("read_header").entered();
            read_header(&mut self.file, options.validation)?
        };
        self.header = Some(header);
        self.advance(Stage::HeaderRead);

        self.segments = {
            let _span = info_span!("read_segments").entered();
            read_segments(&mut self.file, &header)?
        };
        self.advance(Stage::SegmentsRead);

        let segments = {
            let _span = info_span!("map_segments", policy = ?options.map_policy).entered();
            self.map_segments(options.map_policy)?
        };
        self.advance(Stage::SegmentsMapped);

        let entry = EntryPoint::new(header.entry_address).ok_or(Error::NullEntry)?;
        Ok(LoadedImage { entry, segments })
    }

    // Mapping at fixed addresses is done without checking what already lives
    // there (under `MapPolicy::Replace`), and overlapping segments are not
    // detected: the later one wins.
    fn map_segments(&mut self, policy: MapPolicy) -> Result<Vec<MappedSegment>> {
        let mut mapped = Vec::new();

        for (index, descriptor) in self.segments.iter().enumerate() {
            if !descriptor.is_load() {
                trace!(index, p_type = descriptor.segment_type, "skipping segment");
                continue;
            }

            let mut segment = MappedSegment::map(descriptor, policy)
                .map_err(|source| Error::Map { index, source })?;
            segment
                .fill(&mut self.file)
                .map_err(|source| Error::SegmentRead { index, source })?;
            mapped.push(segment);
        }

        debug!(
            mapped = mapped.len(),
            total = self.segments.len(),
            "mapped loadable segments"
        );
        Ok(mapped)
    }

    fn advance(&mut self, stage: Stage) {
        trace!(from = ?self.stage, to = ?stage, "stage");
        self.stage = stage;
    }
}

impl Drop for LoaderState {
    fn drop(&mut self) {
        trace!(
            path = %self.path.display(),
            stage = ?self.stage,
            descriptors = self.segments.len(),
            "releasing loader state"
        );
    }
}

/// Load `path` without running it.
///
/// # Errors
///
/// Returns the first error hit while opening, reading or mapping the image.
pub fn load(path: &Path, options: &LoadOptions) -> Result<LoadedImage> {
    let _span = info_span!("load", path = %path.display()).entered();
    let mut state = LoaderState::open(path)?;
    state.load(options)
}

/// Load `path` and call its entry point.
///
/// # Errors
///
/// Returns the first error hit before control transfer. Faults inside the
/// loaded code are not caught.
///
/// # Safety
///
/// Runs arbitrary machine code from the file in this process, at addresses
/// the file chooses. With `MapPolicy::Replace` those mappings may replace the
/// caller's own memory. The entry point must be code for the host
/// architecture that returns an `i32` under the C calling convention.
pub unsafe fn run(path: &Path, options: &LoadOptions) -> Result<RunReport> {
    let mut state = LoaderState::open(path)?;
    let image = {
        let _span = info_span!("load", path = %path.display()).entered();
        state.load(options)?
    };

    info!(
        entry = %image.entry,
        segments = image.segments.len(),
        "dispatching to entry point"
    );
    let value = unsafe { dispatch(image.entry) };
    state.advance(Stage::Dispatched);
    debug!(value, "entry point returned");

    state.advance(Stage::Done);
    Ok(RunReport {
        entry: image.entry,
        value,
    })
}
