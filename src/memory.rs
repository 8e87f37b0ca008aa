//! Abstraction over the memory of the game image being patched.

use byteorder::{ByteOrder, BE};
use fxhash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("{len} byte access at {address:08x} is outside of the mapped image")]
    Unmapped { address: u32, len: usize },
}

/// Byte-addressable view of the game's 32-bit address space.
///
/// Multi-byte values are big-endian, as on the Wii's Broadway CPU.
pub trait PatchableMemory {
    /// Fills `buf` with the bytes starting at `address`.
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Overwrites the bytes starting at `address`.
    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError>;

    fn read_u8(&self, address: u32) -> Result<u8, MemoryError> {
        let mut buf = [0];
        self.read(address, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&self, address: u32) -> Result<u32, MemoryError> {
        let mut buf = [0; 4];
        self.read(address, &mut buf)?;
        Ok(BE::read_u32(&buf))
    }

    fn write_u8(&mut self, address: u32, value: u8) -> Result<(), MemoryError> {
        self.write(address, &[value])
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        let mut buf = [0; 4];
        BE::write_u32(&mut buf, value);
        self.write(address, &buf)
    }
}

impl<M: PatchableMemory + ?Sized> PatchableMemory for &mut M {
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        (**self).read(address, buf)
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        (**self).write(address, bytes)
    }
}

/// Memory made of individually set bytes, recording every write made to it.
///
/// Reading a byte that was never set fails with [`MemoryError::Unmapped`], while
/// writes are accepted anywhere. Useful as a dry-run target and in tests.
#[derive(Debug, Clone, Default)]
pub struct SparseMemory {
    bytes: FxHashMap<u32, u8>,
    writes: Vec<(u32, Vec<u8>)>,
}

impl SparseMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets bytes without recording them as a write.
    pub fn with_bytes(mut self, address: u32, bytes: &[u8]) -> Self {
        for (i, &b) in bytes.iter().enumerate() {
            self.bytes.insert(address.wrapping_add(i as u32), b);
        }
        self
    }

    pub fn with_u32(self, address: u32, value: u32) -> Self {
        self.with_bytes(address, &value.to_be_bytes())
    }

    /// Every byte currently set, keyed by address.
    pub fn contents(&self) -> &FxHashMap<u32, u8> {
        &self.bytes
    }

    /// Writes performed through [`PatchableMemory::write`], in order.
    pub fn writes(&self) -> &[(u32, Vec<u8>)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

impl PatchableMemory for SparseMemory {
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let len = buf.len();
        for (i, b) in buf.iter_mut().enumerate() {
            *b = *self
                .bytes
                .get(&address.wrapping_add(i as u32))
                .ok_or(MemoryError::Unmapped { address, len })?;
        }
        Ok(())
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        self.writes.push((address, bytes.to_vec()));
        for (i, &b) in bytes.iter().enumerate() {
            self.bytes.insert(address.wrapping_add(i as u32), b);
        }
        Ok(())
    }
}
