//! Segment mapping and filling.

use std::ffi::c_void;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use elfrun_elf::SegmentDescriptor;
use nix::errno::Errno;
use nix::sys::mman::{MapFlags, ProtFlags, mmap_anonymous, munmap};
use nix::unistd::{SysconfVar, sysconf};
use thiserror::Error;
use tracing::{debug, warn};

/// Top of the 32-bit address space a segment may reach.
const ADDRESS_SPACE_END: u64 = 1 << 32;

/// Used when the host does not report a page size.
const DEFAULT_PAGE_SIZE: u64 = 0x1000;

fn page_size() -> u64 {
    sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .and_then(|size| u64::try_from(size).ok())
        .filter(|&size| size > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

/// Flags for a fixed-address mapping that fails if the range is taken.
///
/// Uses `MAP_FIXED_NOREPLACE` on Linux. Falls back to `MAP_FIXED` on
/// macOS/BSD (will unmap existing mappings).
#[cfg(target_os = "linux")]
const fn no_replace_flags() -> MapFlags {
    MapFlags::MAP_FIXED_NOREPLACE
}

#[cfg(not(target_os = "linux"))]
const fn no_replace_flags() -> MapFlags {
    MapFlags::MAP_FIXED
}

/// What to do when the target range of a segment is already mapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MapPolicy {
    /// `MAP_FIXED`: silently replace whatever the host has mapped there,
    /// including the loader's own code, data or stack.
    #[default]
    Replace,
    /// Fail with `FixedAddressUnavailable` instead of replacing.
    NoReplace,
}

impl MapPolicy {
    const fn flags(self) -> MapFlags {
        match self {
            Self::Replace => MapFlags::MAP_FIXED,
            Self::NoReplace => no_replace_flags(),
        }
    }
}

/// Mapping errors.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("mmap of {len:#x} bytes at {addr:#x} failed: {source}")]
    MmapFailed {
        addr: u32,
        len: u32,
        #[source]
        source: Errno,
    },

    #[error("segment at {0:#x} has zero memory size")]
    InvalidSize(u32),

    #[error("segment cannot be mapped at address 0")]
    InvalidAddress,

    #[error("segment at {addr:#x} with size {len:#x} runs past the 32-bit address space")]
    AddressOverflow { addr: u32, len: u32 },

    #[error("fixed address {0:#x} is not available (already mapped or reserved)")]
    FixedAddressUnavailable(u32),
}

/// Errors copying segment bytes into a mapping.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("failed to seek to segment data at {offset:#x}: {source}")]
    Seek {
        offset: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("segment data of {file_size:#x} bytes overruns the {mapped_len:#x}-byte mapping")]
    ExceedsMapping { file_size: u32, mapped_len: usize },

    #[error("segment data truncated: expected {expected:#x} bytes at {offset:#x}")]
    Truncated { offset: u32, expected: u32 },

    #[error("failed to read segment data at {offset:#x}: {source}")]
    Read {
        offset: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Region created for one loadable segment.
///
/// Dropping this does not unmap the region.
#[derive(Debug)]
pub struct MappedSegment {
    addr: NonNull<c_void>,
    /// `memory_size` rounded up to whole pages.
    mapped_len: usize,
    descriptor: SegmentDescriptor,
}

impl MappedSegment {
    /// Map `descriptor.memory_size` bytes, rounded up to whole pages, of
    /// zeroed read/write/execute memory at `descriptor.virtual_address`.
    ///
    /// The address is used as-is; a range that is not page aligned is
    /// rejected by the host. `file_size` is not compared with `memory_size`
    /// here; `fill` checks it against the mapped length.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot describe a fixed mapping or
    /// if mmap fails.
    pub fn map(descriptor: &SegmentDescriptor, policy: MapPolicy) -> Result<Self, MapError> {
        let addr = descriptor.virtual_address;
        let len = descriptor.memory_size;
        if len == 0 {
            return Err(MapError::InvalidSize(addr));
        }

        let mapped_len = u64::from(len).next_multiple_of(page_size());
        if u64::from(addr) + mapped_len > ADDRESS_SPACE_END {
            return Err(MapError::AddressOverflow { addr, len });
        }

        let overflow = |_| MapError::AddressOverflow { addr, len };
        let addr_nz = NonZeroUsize::new(usize::try_from(addr).map_err(overflow)?)
            .ok_or(MapError::InvalidAddress)?;
        let len_nz = NonZeroUsize::new(usize::try_from(mapped_len).map_err(overflow)?)
            .ok_or(MapError::InvalidSize(addr))?;

        // Fresh anonymous pages are zero-filled, which covers the tail past
        // file_size.
        let region = unsafe {
            mmap_anonymous(
                Some(addr_nz),
                len_nz,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE | ProtFlags::PROT_EXEC,
                MapFlags::MAP_PRIVATE | policy.flags(),
            )
            .map_err(|e| {
                if e == Errno::EEXIST {
                    MapError::FixedAddressUnavailable(addr)
                } else {
                    MapError::MmapFailed { addr, len, source: e }
                }
            })?
        };

        // Kernels without MAP_FIXED_NOREPLACE treat the address as a hint.
        if region.as_ptr() as usize != addr_nz.get() {
            warn!(
                requested = format_args!("{addr:#x}"),
                actual = format_args!("{:p}", region.as_ptr()),
                "host placed mapping elsewhere"
            );
            unsafe {
                let _ = munmap(region, len_nz.get());
            }
            return Err(MapError::FixedAddressUnavailable(addr));
        }

        debug!(
            addr = format_args!("{addr:#x}"),
            memsz = format_args!("{len:#x}"),
            mapped = format_args!("{:#x}", len_nz.get()),
            filesz = format_args!("{:#x}", descriptor.file_size),
            ?policy,
            "mapped segment"
        );

        Ok(Self {
            addr: region,
            mapped_len: len_nz.get(),
            descriptor: *descriptor,
        })
    }

    /// Copy `file_size` bytes from `file_offset` in `reader` to the start of
    /// the mapping.
    ///
    /// On error the mapping stays in place, partially filled.
    ///
    /// # Errors
    ///
    /// Returns an error if `file_size` does not fit in the mapping, the seek
    /// fails, or fewer than `file_size` bytes can be read.
    pub fn fill<R: Read + Seek>(&mut self, reader: &mut R) -> Result<(), FillError> {
        let offset = self.descriptor.file_offset;
        let expected = self.descriptor.file_size;

        // A file_size past memory_size is tolerated as long as it stays
        // inside the pages actually mapped.
        let len = usize::try_from(expected)
            .ok()
            .filter(|&len| len <= self.mapped_len)
            .ok_or(FillError::ExceedsMapping {
                file_size: expected,
                mapped_len: self.mapped_len,
            })?;

        reader
            .seek(SeekFrom::Start(u64::from(offset)))
            .map_err(|source| FillError::Seek { offset, source })?;

        // `len` fits in the mapping, and nothing else in this process holds
        // a reference into it.
        let dst = unsafe { std::slice::from_raw_parts_mut(self.as_ptr(), len) };
        reader.read_exact(dst).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                FillError::Truncated { offset, expected }
            } else {
                FillError::Read { offset, source: e }
            }
        })?;

        debug!(
            addr = format_args!("{:#x}", self.descriptor.virtual_address),
            offset = format_args!("{offset:#x}"),
            bytes = expected,
            "filled segment"
        );
        Ok(())
    }

    /// Pointer to the start of the mapping.
    #[must_use]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr().cast::<u8>()
    }

    /// The descriptor this mapping was created from.
    #[must_use]
    pub const fn descriptor(&self) -> &SegmentDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub const fn virtual_address(&self) -> u32 {
        self.descriptor.virtual_address
    }

    #[must_use]
    pub const fn memory_size(&self) -> u32 {
        self.descriptor.memory_size
    }

    #[must_use]
    pub const fn file_size(&self) -> u32 {
        self.descriptor.file_size
    }

    /// Length actually mapped: `memory_size` rounded up to whole pages.
    #[must_use]
    pub const fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// View the whole mapping, including the zero-filled tail and the
    /// rounding up to whole pages.
    ///
    /// # Safety
    ///
    /// No other mapping may have been placed over this range, and the
    /// loaded program must not be running concurrently.
    #[must_use]
    pub unsafe fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.mapped_len) }
    }

    /// Release the mapping. Only tests give regions back; the loader never
    /// does.
    #[cfg(test)]
    unsafe fn unmap(self) {
        unsafe {
            let _ = munmap(self.addr, self.mapped_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Each test uses its own range in the low 4GB, which a 64-bit test
    // process leaves free. NoReplace keeps a stray collision from clobbering
    // the test harness.
    const BASE: u32 = 0x2000_0000;

    fn source(offset: usize, data: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = vec![0xEEu8; offset];
        bytes.extend_from_slice(data);
        bytes.extend_from_slice(&[0xEE; 64]);
        Cursor::new(bytes)
    }

    #[test]
    fn test_map_and_fill_zero_tail() {
        let addr = BASE;
        let data: Vec<u8> = (0..=255).collect();
        let desc = SegmentDescriptor::load(addr, 0x40, 256, 0x3000);
        let mut reader = source(0x40, &data);

        let mut seg = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        seg.fill(&mut reader).expect("fill should succeed");

        assert_eq!(seg.as_ptr() as usize, addr as usize);
        unsafe {
            let bytes = seg.as_slice();
            assert_eq!(bytes.len(), seg.mapped_len());
            assert!(seg.mapped_len() >= 0x3000);
            assert_eq!(&bytes[..256], &data[..]);
            assert!(bytes[256..].iter().all(|&b| b == 0));
            seg.unmap();
        }
    }

    #[test]
    fn test_fill_truncated() {
        let desc = SegmentDescriptor::load(BASE + 0x10_0000, 0x10, 0x100, 0x1000);
        let mut reader = Cursor::new(vec![1u8; 0x20]);

        let mut seg = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        let err = seg.fill(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            FillError::Truncated {
                offset: 0x10,
                expected: 0x100
            }
        ));
        unsafe { seg.unmap() };
    }

    #[test]
    fn test_empty_file_portion() {
        let desc = SegmentDescriptor::load(BASE + 0x20_0000, 0, 0, 0x1000);
        let mut reader = Cursor::new(Vec::new());

        let mut seg = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        seg.fill(&mut reader).expect("nothing to copy");
        unsafe {
            assert!(seg.as_slice().iter().all(|&b| b == 0));
            seg.unmap();
        }
    }

    #[test]
    fn test_file_size_past_memory_size_within_page() {
        let addr = BASE + 0x30_0000;
        let data: Vec<u8> = (1..=0x20).collect();
        let desc = SegmentDescriptor::load(addr, 0, 0x20, 0x10);
        let mut reader = source(0, &data);

        let mut seg = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        assert!(seg.mapped_len() >= 0x20);
        seg.fill(&mut reader).expect("data fits in the mapped page");
        unsafe {
            let bytes = seg.as_slice();
            assert_eq!(&bytes[..0x20], &data[..]);
            assert!(bytes[0x20..].iter().all(|&b| b == 0));
            seg.unmap();
        }
    }

    #[test]
    fn test_file_size_overruns_mapping() {
        let desc = SegmentDescriptor::load(BASE + 0x38_0000, 0, 0x10_0000, 0x10);
        let mut reader = Cursor::new(vec![0xCCu8; 0x10_0000]);

        let mut seg = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        let mapped_len = seg.mapped_len();
        let err = seg.fill(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            FillError::ExceedsMapping { file_size: 0x10_0000, mapped_len: len } if len == mapped_len
        ));
        unsafe {
            assert!(seg.as_slice().iter().all(|&b| b == 0));
            seg.unmap();
        }
    }

    #[test]
    fn test_invalid_descriptors() {
        let zero_size = SegmentDescriptor::load(BASE + 0x40_0000, 0, 0, 0);
        assert!(matches!(
            MappedSegment::map(&zero_size, MapPolicy::NoReplace),
            Err(MapError::InvalidSize(_))
        ));

        let null = SegmentDescriptor::load(0, 0, 0, 0x1000);
        assert!(matches!(
            MappedSegment::map(&null, MapPolicy::NoReplace),
            Err(MapError::InvalidAddress)
        ));

        let wrapping = SegmentDescriptor::load(0xFFFF_F000, 0, 0, 0x2000);
        assert!(matches!(
            MappedSegment::map(&wrapping, MapPolicy::NoReplace),
            Err(MapError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn test_unaligned_address_rejected_by_host() {
        let desc = SegmentDescriptor::load(BASE + 0x50_0010, 0, 0, 0x1000);
        let err = MappedSegment::map(&desc, MapPolicy::NoReplace).unwrap_err();
        assert!(matches!(
            err,
            MapError::MmapFailed {
                source: Errno::EINVAL,
                ..
            }
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_no_replace_collision() {
        let desc = SegmentDescriptor::load(BASE + 0x60_0000, 0, 0, 0x2000);
        let first = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");

        let overlapping = SegmentDescriptor::load(BASE + 0x60_1000, 0, 0, 0x1000);
        let err = MappedSegment::map(&overlapping, MapPolicy::NoReplace).unwrap_err();
        assert!(matches!(err, MapError::FixedAddressUnavailable(a) if a == BASE + 0x60_1000));

        unsafe { first.unmap() };
    }

    #[test]
    fn test_replace_overwrites_existing_mapping() {
        let desc = SegmentDescriptor::load(BASE + 0x70_0000, 0, 4, 0x1000);
        let mut first = MappedSegment::map(&desc, MapPolicy::NoReplace).expect("mmap should succeed");
        first.fill(&mut Cursor::new(vec![7u8; 4])).expect("fill should succeed");

        let second = MappedSegment::map(&desc, MapPolicy::Replace).expect("replace should succeed");
        unsafe {
            assert!(second.as_slice().iter().all(|&b| b == 0));
            second.unmap();
        }
    }
}
