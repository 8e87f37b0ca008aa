//! Encoding and installation of PowerPC relative branches.

use std::fmt;

use crate::{
    build::{identify_build, BuildCode},
    memory::{MemoryError, PatchableMemory},
};

/// Primary opcode 18 (`b`), with AA and LK cleared.
pub const BRANCH_OPCODE: u32 = 0x4800_0000;

/// The LI field of an I-form branch: 24 bits of word displacement, shifted left by 2.
pub const BRANCH_DISPLACEMENT_MASK: u32 = 0x03FF_FFFC;

/// LK bit. Set for `bl`.
pub const LINK_BIT: u32 = 1;

/// Largest forward displacement representable in the LI field.
pub const MAX_BRANCH_DISPLACEMENT: i64 = (1 << 25) - 4;

/// Largest backward displacement representable in the LI field.
pub const MIN_BRANCH_DISPLACEMENT: i64 = -(1 << 25);

/// A 32-bit encoded `b` or `bl` instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct BranchInstruction(u32);

impl BranchInstruction {
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The same branch, but saving the return address to LR (`bl`).
    pub const fn with_link(self) -> Self {
        Self(self.0 | LINK_BIT)
    }

    pub const fn is_link(self) -> bool {
        self.0 & LINK_BIT != 0
    }

    /// Signed byte displacement stored in the instruction.
    pub const fn displacement(self) -> i32 {
        // Sign-extend the 26-bit field
        (((self.0 & BRANCH_DISPLACEMENT_MASK) << 6) as i32) >> 6
    }

    /// Address this instruction jumps to when placed at `source`.
    pub const fn target(self, source: u32) -> u32 {
        source.wrapping_add_signed(self.displacement())
    }
}

impl fmt::Debug for BranchInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mnemonic = if self.is_link() { "bl" } else { "b" };
        write!(f, "{:08x} ({mnemonic} {:#x})", self.0, self.displacement())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BranchError {
    #[error("branch from {from:08x} to {to:08x} is out of range")]
    OutOfRange { from: u32, to: u32 },
    #[error("branch from {from:08x} to {to:08x} is not word aligned")]
    Misaligned { from: u32, to: u32 },
}

/// Encodes `b destination` as if located at `source`.
///
/// The displacement is masked to the LI field without any range check, so
/// distances beyond +/-32 MiB silently wrap. Use [`encode_branch_checked`] to
/// reject those instead.
pub const fn encode_branch(source: u32, destination: u32) -> BranchInstruction {
    BranchInstruction(BRANCH_OPCODE | (destination.wrapping_sub(source) & BRANCH_DISPLACEMENT_MASK))
}

/// Like [`encode_branch`], but fails if the branch would not reach `destination`.
pub fn encode_branch_checked(
    source: u32,
    destination: u32,
) -> Result<BranchInstruction, BranchError> {
    if (source | destination) & 3 != 0 {
        return Err(BranchError::Misaligned {
            from: source,
            to: destination,
        });
    }

    let displacement = destination as i64 - source as i64;
    if !(MIN_BRANCH_DISPLACEMENT..=MAX_BRANCH_DISPLACEMENT).contains(&displacement) {
        return Err(BranchError::OutOfRange {
            from: source,
            to: destination,
        });
    }

    Ok(encode_branch(source, destination))
}

/// Writes `instruction` at `source` as a single 4-byte store.
pub fn install_branch<M: PatchableMemory + ?Sized>(
    memory: &mut M,
    source: u32,
    instruction: BranchInstruction,
) -> Result<(), MemoryError> {
    memory.write_u32(source, instruction.raw())?;
    log::trace!("Installed {instruction:?} at {source:08x}");
    Ok(())
}

/// Redirects execution at `source` to `destination`, if the running build matches.
///
/// The build is identified from `memory` first. Nothing is written when the
/// build is unknown or when `predicate` rejects it; the return value tells
/// whether the branch was installed.
///
/// `source` should be word aligned and inside the patchable part of the image.
/// Errors only come from the memory itself.
pub fn install_conditional_branch<M, P>(
    memory: &mut M,
    predicate: P,
    source: u32,
    destination: u32,
) -> Result<bool, MemoryError>
where
    M: PatchableMemory + ?Sized,
    P: FnOnce(BuildCode) -> bool,
{
    let build = identify_build(&*memory);
    if !build.is_known() {
        log::debug!("Not installing branch at {source:08x}: {build}");
        return Ok(false);
    }
    if !predicate(build) {
        log::debug!("Branch at {source:08x} does not apply to {build}");
        return Ok(false);
    }

    install_branch(memory, source, encode_branch(source, destination))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_sign_extends() {
        let b = encode_branch(0x8000_0100, 0x8000_0000);
        assert_eq!(b.displacement(), -0x100);
        assert_eq!(b.target(0x8000_0100), 0x8000_0000);
    }

    #[test]
    fn link_bit() {
        let bl = encode_branch(0x8000_0000, 0x8000_0010).with_link();
        assert_eq!(bl.raw(), 0x4800_0011);
        assert!(bl.is_link());
        assert_eq!(bl.displacement(), 0x10);
    }

    #[test]
    fn checked_range_limits() {
        let src = 0x8100_0000;
        assert!(encode_branch_checked(src, src + MAX_BRANCH_DISPLACEMENT as u32).is_ok());
        assert!(encode_branch_checked(src, src - (1 << 25)).is_ok());
        assert_eq!(
            encode_branch_checked(src, src + (1 << 25)),
            Err(BranchError::OutOfRange {
                from: src,
                to: src + (1 << 25)
            })
        );
        assert!(matches!(
            encode_branch_checked(src, src + 2),
            Err(BranchError::Misaligned { .. })
        ));
    }
}
