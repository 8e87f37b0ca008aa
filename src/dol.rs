//! Minimal reader/writer for Wii DOL executables.
//!
//! A DOL is a 0x100 byte header followed by up to 7 text and 11 data sections,
//! each copied verbatim to a fixed virtual address at load time. [`DolImage`]
//! maps those addresses back to file offsets so that the main executable can
//! be identified and patched on disk, exactly as it would be in memory.

use byteorder::{ByteOrder, BE};

use crate::memory::{MemoryError, PatchableMemory};

pub const HEADER_SIZE: usize = 0x100;
pub const TEXT_SECTION_COUNT: usize = 7;
pub const DATA_SECTION_COUNT: usize = 11;

const OFFSETS_TABLE: usize = 0x00;
const ADDRESSES_TABLE: usize = 0x48;
const SIZES_TABLE: usize = 0x90;
const BSS_ADDRESS: usize = 0xd8;
const BSS_SIZE: usize = 0xdc;
const ENTRY_POINT: usize = 0xe0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DolError {
    #[error("file is {0} bytes long, smaller than a DOL header")]
    TooSmall(usize),
    #[error("{kind:?} section {index} ({offset:#x}+{size:#x}) extends past the end of the file")]
    SectionOutOfBounds {
        kind: SectionKind,
        index: usize,
        offset: u32,
        size: u32,
    },
    #[error("sections loaded at {first:08x} and {second:08x} overlap")]
    Overlapping { first: u32, second: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DolSection {
    pub kind: SectionKind,
    pub index: usize,
    pub file_offset: u32,
    pub address: u32,
    pub size: u32,
}

impl DolSection {
    pub fn contains(&self, address: u32, len: usize) -> bool {
        let start = address as u64;
        let section_start = self.address as u64;
        start >= section_start && start + len as u64 <= section_start + self.size as u64
    }
}

/// A DOL file held in memory.
#[derive(Debug, Clone)]
pub struct DolImage {
    data: Vec<u8>,
    sections: Vec<DolSection>,
}

impl DolImage {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, DolError> {
        if data.len() < HEADER_SIZE {
            return Err(DolError::TooSmall(data.len()));
        }

        let mut sections = Vec::new();
        for slot in 0..TEXT_SECTION_COUNT + DATA_SECTION_COUNT {
            let (kind, index) = match slot {
                s if s < TEXT_SECTION_COUNT => (SectionKind::Text, s),
                s => (SectionKind::Data, s - TEXT_SECTION_COUNT),
            };
            let file_offset = BE::read_u32(&data[OFFSETS_TABLE + 4 * slot..]);
            let address = BE::read_u32(&data[ADDRESSES_TABLE + 4 * slot..]);
            let size = BE::read_u32(&data[SIZES_TABLE + 4 * slot..]);
            if size == 0 {
                continue;
            }

            if file_offset as u64 + size as u64 > data.len() as u64 {
                return Err(DolError::SectionOutOfBounds {
                    kind,
                    index,
                    offset: file_offset,
                    size,
                });
            }

            sections.push(DolSection {
                kind,
                index,
                file_offset,
                address,
                size,
            });
        }

        let mut by_address = sections.clone();
        by_address.sort_by_key(|s| s.address);
        for pair in by_address.windows(2) {
            if pair[0].address as u64 + pair[0].size as u64 > pair[1].address as u64 {
                return Err(DolError::Overlapping {
                    first: pair[0].address,
                    second: pair[1].address,
                });
            }
        }

        log::debug!("Loaded DOL with {} sections", sections.len());
        Ok(Self { data, sections })
    }

    pub fn sections(&self) -> &[DolSection] {
        &self.sections
    }

    pub fn entry_point(&self) -> u32 {
        BE::read_u32(&self.data[ENTRY_POINT..])
    }

    pub fn bss(&self) -> (u32, u32) {
        (
            BE::read_u32(&self.data[BSS_ADDRESS..]),
            BE::read_u32(&self.data[BSS_SIZE..]),
        )
    }

    /// File offset of the `len` bytes at virtual `address`, if they are all
    /// backed by the same section.
    pub fn file_offset(&self, address: u32, len: usize) -> Option<usize> {
        self.sections
            .iter()
            .find(|s| s.contains(address, len))
            .map(|s| (s.file_offset + (address - s.address)) as usize)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl PatchableMemory for DolImage {
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let offset = self
            .file_offset(address, buf.len())
            .ok_or(MemoryError::Unmapped {
                address,
                len: buf.len(),
            })?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let offset = self
            .file_offset(address, bytes.len())
            .ok_or(MemoryError::Unmapped {
                address,
                len: bytes.len(),
            })?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Builds DOL files from scratch. Mostly useful for tests and tooling.
#[derive(Debug, Clone, Default)]
pub struct DolBuilder {
    text: Vec<(u32, Vec<u8>)>,
    data: Vec<(u32, Vec<u8>)>,
    bss: (u32, u32),
    entry_point: u32,
}

impl DolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text section. Sections beyond the 7 the format allows are ignored.
    pub fn text(mut self, address: u32, contents: Vec<u8>) -> Self {
        if self.text.len() < TEXT_SECTION_COUNT {
            self.text.push((address, contents));
        }
        self
    }

    /// Adds a data section. Sections beyond the 11 the format allows are ignored.
    pub fn data(mut self, address: u32, contents: Vec<u8>) -> Self {
        if self.data.len() < DATA_SECTION_COUNT {
            self.data.push((address, contents));
        }
        self
    }

    pub fn bss(mut self, address: u32, size: u32) -> Self {
        self.bss = (address, size);
        self
    }

    pub fn entry_point(mut self, address: u32) -> Self {
        self.entry_point = address;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];

        let slots = self
            .text
            .iter()
            .enumerate()
            .chain(
                self.data
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (i + TEXT_SECTION_COUNT, s)),
            )
            .collect::<Vec<_>>();

        for (slot, (address, contents)) in slots {
            let offset = out.len() as u32;
            BE::write_u32(&mut out[OFFSETS_TABLE + 4 * slot..], offset);
            BE::write_u32(&mut out[ADDRESSES_TABLE + 4 * slot..], *address);
            BE::write_u32(&mut out[SIZES_TABLE + 4 * slot..], contents.len() as u32);
            out.extend_from_slice(contents);
        }

        BE::write_u32(&mut out[BSS_ADDRESS..], self.bss.0);
        BE::write_u32(&mut out[BSS_SIZE..], self.bss.1);
        BE::write_u32(&mut out[ENTRY_POINT..], self.entry_point);
        out
    }
}
