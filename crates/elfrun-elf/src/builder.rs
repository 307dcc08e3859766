//! In-memory ELF32 image assembly.

use crate::constants::*;
use crate::header::{FileHeader, SegmentDescriptor};

const PAGE_SIZE: usize = 0x1000;

/// Assembles a minimal executable image: file header, program header table,
/// then each segment's file contents at its own page-aligned offset.
#[derive(Clone, Debug, Default)]
pub struct ImageBuilder {
    entry_address: u32,
    descriptors: Vec<SegmentDescriptor>,
    payloads: Vec<(usize, Vec<u8>)>,
}

impl ImageBuilder {
    #[must_use]
    pub fn new(entry_address: u32) -> Self {
        Self {
            entry_address,
            ..Self::default()
        }
    }

    /// Add a `PT_LOAD` segment holding `data`, reserving `memory_size` bytes
    /// at `virtual_address`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn load(mut self, virtual_address: u32, data: &[u8], memory_size: u32) -> Self {
        let index = self.descriptors.len();
        self.descriptors.push(SegmentDescriptor::load(
            virtual_address,
            0,
            data.len() as u32,
            memory_size,
        ));
        self.payloads.push((index, data.to_vec()));
        self
    }

    /// Add a descriptor verbatim, without file contents.
    #[must_use]
    pub fn descriptor(mut self, descriptor: SegmentDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Lay out the image bytes.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(&self) -> Vec<u8> {
        let header = FileHeader::executable(self.entry_address, self.descriptors.len() as u16);
        let table_end = EHDR_SIZE + self.descriptors.len() * PHDR_SIZE;

        let mut descriptors = self.descriptors.clone();
        let mut contents = Vec::new();
        let mut offset = table_end.next_multiple_of(PAGE_SIZE);
        for (index, data) in &self.payloads {
            descriptors[*index].file_offset = offset as u32;
            contents.push((offset, data.as_slice()));
            offset = (offset + data.len()).next_multiple_of(PAGE_SIZE);
        }

        let mut image = header.encode().to_vec();
        for descriptor in &descriptors {
            image.extend_from_slice(&descriptor.encode());
        }
        for (offset, data) in contents {
            image.resize(offset, 0);
            image.extend_from_slice(data);
        }
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Validation, read_header, read_segments};
    use std::io::Cursor;

    #[test]
    fn test_builder_layout() {
        let image = ImageBuilder::new(0x1000_0000)
            .load(0x1000_0000, &[1, 2, 3], 0x1000)
            .descriptor(SegmentDescriptor {
                segment_type: PT_NOTE,
                ..SegmentDescriptor::default()
            })
            .load(0x1001_0000, &[4; 0x1800], 0x2000)
            .build();

        let mut cursor = Cursor::new(image.clone());
        let header = read_header(&mut cursor, Validation::Strict).expect("header should parse");
        let segments = read_segments(&mut cursor, &header).expect("table should parse");

        assert_eq!(header.entry_address, 0x1000_0000);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].file_offset, 0x1000);
        assert_eq!(&image[0x1000..0x1003], &[1, 2, 3]);
        assert_eq!(segments[1].segment_type, PT_NOTE);
        assert_eq!(segments[2].file_offset, 0x2000);
        assert_eq!(segments[2].file_size, 0x1800);
        assert_eq!(image.len(), 0x3800);
    }
}
