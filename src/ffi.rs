//! C ABI for loaders running inside the game, where addresses are real pointers.

use crate::{
    branch::{encode_branch, install_conditional_branch},
    build::{identify_build, BuildCode},
    memory::{MemoryError, PatchableMemory},
};

/// The address space of the current process.
///
/// Every access dereferences the address as a raw pointer. No bounds are known,
/// so accesses never fail.
#[derive(Debug)]
pub struct HostMemory(());

impl HostMemory {
    /// # Safety
    /// Every address later read or written through this value must be valid
    /// for that access, and writes must not race with code executing it.
    pub unsafe fn new() -> Self {
        Self(())
    }
}

impl PatchableMemory for HostMemory {
    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let src = address as usize as *const u8;
        // SAFETY: guaranteed by the caller of `HostMemory::new`
        unsafe { std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }

    fn write(&mut self, address: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        let dst = address as usize as *mut u8;
        // SAFETY: guaranteed by the caller of `HostMemory::new`
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
        Ok(())
    }

    fn write_u32(&mut self, address: u32, value: u32) -> Result<(), MemoryError> {
        // A single aligned store, rather than a byte-wise copy
        let dst = address as usize as *mut u32;
        // SAFETY: guaranteed by the caller of `HostMemory::new`
        unsafe { dst.write_volatile(value.to_be()) };
        Ok(())
    }
}

pub type BuildPredicateCallback = unsafe extern "C" fn(build: u8) -> bool;

/// Returns the [`BuildCode`] of the running game, or 0 if it is not recognized.
///
/// # Safety
/// Must be called from within the game's address space.
#[no_mangle]
pub unsafe extern "C" fn nsmbw_identify_build() -> u8 {
    let memory = unsafe { HostMemory::new() };
    identify_build(&memory).raw()
}

/// Encodes a `b` instruction at `source` jumping to `destination`.
#[no_mangle]
pub extern "C" fn nsmbw_assemble_branch(source: u32, destination: u32) -> u32 {
    encode_branch(source, destination).raw()
}

/// Calls back into C to decide on the branch, then installs it into `memory`.
///
/// # Safety
/// `predicate` must be safe to call.
unsafe fn install_with_callback<M: PatchableMemory + ?Sized>(
    memory: &mut M,
    predicate: BuildPredicateCallback,
    source: u32,
    destination: u32,
) -> bool {
    install_conditional_branch(
        memory,
        |build: BuildCode| unsafe { predicate(build.raw()) },
        source,
        destination,
    )
    .unwrap_or(false)
}

/// Writes a branch from `source` to `destination` if `predicate` accepts the
/// running build. Returns whether the branch was written.
///
/// # Safety
/// `source` must be a word-aligned, writable address of the game's code, and
/// `predicate` must be safe to call.
#[no_mangle]
pub unsafe extern "C" fn nsmbw_install_conditional_branch(
    predicate: BuildPredicateCallback,
    source: u32,
    destination: u32,
) -> bool {
    let mut memory = unsafe { HostMemory::new() };
    unsafe { install_with_callback(&mut memory, predicate, source, destination) }
}
