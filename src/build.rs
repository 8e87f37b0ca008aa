//! Identification of the New Super Mario Bros. Wii build loaded in memory.

use std::{fmt, str::FromStr};

use crate::memory::PatchableMemory;

/// Address of the 4-byte instruction word that differs between releases.
pub const SIGNATURE_ADDRESS: u32 = 0x800c_f6cc;

/// Address of the byte used to tell apart the Korean and Taiwanese releases,
/// which share the same word at [`SIGNATURE_ADDRESS`].
pub const DISAMBIGUATION_ADDRESS: u32 = 0x8000_423a;

/// Distribution variant of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Region {
    /// Europe / PAL.
    P = 1,
    /// North America.
    E = 2,
    /// Japan.
    J = 3,
    /// Korea.
    K = 4,
    /// Taiwan.
    W = 5,
    /// China (NVIDIA SHIELD).
    C = 6,
}

impl Region {
    pub const ALL: [Region; 6] = [
        Region::P,
        Region::E,
        Region::J,
        Region::K,
        Region::W,
        Region::C,
    ];

    fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| *r as u8 == raw)
    }

    pub fn letter(self) -> char {
        match self {
            Region::P => 'P',
            Region::E => 'E',
            Region::J => 'J',
            Region::K => 'K',
            Region::W => 'W',
            Region::C => 'C',
        }
    }
}

/// Release iteration of the game.
///
/// Discriminants are chronological across all regions, so comparisons such as
/// `revision < Revision::K` mean "released before the Korean version".
/// The value 3 is reserved for the Wii U eShop release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Revision {
    V1 = 1,
    V2 = 2,
    K = 4,
    W = 5,
    C = 6,
}

impl Revision {
    pub const ALL: [Revision; 5] = [
        Revision::V1,
        Revision::V2,
        Revision::K,
        Revision::W,
        Revision::C,
    ];

    fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| *r as u8 == raw)
    }
}

/// One of the nine known releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Build {
    P1,
    E1,
    J1,
    P2,
    E2,
    J2,
    K,
    W,
    C,
}

impl Build {
    /// All builds, in chronological order of revision.
    pub const ALL: [Build; 9] = [
        Build::P1,
        Build::E1,
        Build::J1,
        Build::P2,
        Build::E2,
        Build::J2,
        Build::K,
        Build::W,
        Build::C,
    ];

    pub fn region(self) -> Region {
        match self {
            Build::P1 | Build::P2 => Region::P,
            Build::E1 | Build::E2 => Region::E,
            Build::J1 | Build::J2 => Region::J,
            Build::K => Region::K,
            Build::W => Region::W,
            Build::C => Region::C,
        }
    }

    pub fn revision(self) -> Revision {
        match self {
            Build::P1 | Build::E1 | Build::J1 => Revision::V1,
            Build::P2 | Build::E2 | Build::J2 => Revision::V2,
            Build::K => Revision::K,
            Build::W => Revision::W,
            Build::C => Revision::C,
        }
    }

    pub fn code(self) -> BuildCode {
        BuildCode::new(self.region(), self.revision())
    }

    pub fn name(self) -> &'static str {
        match self {
            Build::P1 => "P1",
            Build::E1 => "E1",
            Build::J1 => "J1",
            Build::P2 => "P2",
            Build::E2 => "E2",
            Build::J2 => "J2",
            Build::K => "K",
            Build::W => "W",
            Build::C => "C",
        }
    }
}

impl fmt::Display for Build {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a known build (expected one of P1, E1, J1, P2, E2, J2, K, W, C)")]
pub struct ParseBuildError(String);

impl FromStr for Build {
    type Err = ParseBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Build::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseBuildError(s.to_owned()))
    }
}

/// Compact region + revision pair identifying a build.
///
/// The revision lives in the high nibble and the region in the low nibble.
/// The zero value is [`BuildCode::UNKNOWN`], returned when identification
/// fails; nothing should be patched for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct BuildCode(u8);

impl BuildCode {
    pub const UNKNOWN: BuildCode = BuildCode(0);

    pub const fn new(region: Region, revision: Revision) -> Self {
        Self(((revision as u8) << 4) | region as u8)
    }

    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_known(self) -> bool {
        self.0 != 0
    }

    pub fn region(self) -> Option<Region> {
        Region::from_raw(self.0 & 0xF)
    }

    pub fn revision(self) -> Option<Revision> {
        Revision::from_raw(self.0 >> 4)
    }

    /// The named build this code corresponds to, if any.
    pub fn build(self) -> Option<Build> {
        Build::ALL.into_iter().find(|b| b.code() == self)
    }
}

impl From<Build> for BuildCode {
    fn from(build: Build) -> Self {
        build.code()
    }
}

impl fmt::Display for BuildCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.build() {
            Some(build) => write!(f, "{build}"),
            None if self.is_known() => write!(f, "unnamed build {:#04x}", self.0),
            None => f.write_str("unknown build"),
        }
    }
}

/// Classifies the image behind `memory`.
///
/// Reads the word at [`SIGNATURE_ADDRESS`], and for the one value shared by two
/// releases, the byte at [`DISAMBIGUATION_ADDRESS`]. Never fails: unreadable
/// memory and unrecognized signatures both yield [`BuildCode::UNKNOWN`].
///
/// If an earlier patch already rewrote either location, the result may be wrong.
pub fn identify_build<M: PatchableMemory + ?Sized>(memory: &M) -> BuildCode {
    let Ok(signature) = memory.read_u32(SIGNATURE_ADDRESS) else {
        log::debug!("Signature at {SIGNATURE_ADDRESS:08x} is not readable");
        return BuildCode::UNKNOWN;
    };

    let build = match signature {
        0x4082_0030 => Some(Build::P1),
        0x4082_0038 => Some(Build::P2),
        0x4800_0465 => Some(Build::E1),
        0x2c03_0000 => Some(Build::E2),
        0x4800_00b4 => Some(Build::J1),
        0x4082_000c => Some(Build::J2),
        0x38a0_0001 => match memory.read_u8(DISAMBIGUATION_ADDRESS) {
            Ok(0xc8) => Some(Build::K),
            Ok(0xac) => Some(Build::W),
            _ => None,
        },
        0x4182_000c => Some(Build::C),
        _ => None,
    };

    match build {
        Some(build) => {
            log::debug!("Identified build {build}");
            build.code()
        }
        None => {
            log::debug!("Unrecognized signature {signature:08x}");
            BuildCode::UNKNOWN
        }
    }
}
