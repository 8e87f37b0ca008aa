//! Built-in bug fixes.
//!
//! Unless noted otherwise, addresses are those of the P1 (PAL, first revision)
//! build and the sites are gated to it. Fixes that were hand-ported to other
//! builds carry the predicate of the builds their address is valid for.

use std::borrow::Cow;

use crate::build::{Build, Revision};

use super::{BuildPredicate, Catalog, CatalogEntry, Destination, PatchSite};

/// Injected replacement for the tail of
/// `dCourseSelectGuide_c::executeState_ScrollGuideOnStageWait()`.
pub const WORLD_MAP_HUD_SYMBOL: &str = "executeState_ScrollGuideOnStageWait_new_end";

/// Injected active player check for `daLiftRemoconSeesaw_c::executeState_Move()`.
pub const TILT_LIFT_SYMBOL: &str = "executeState_Move_activePlayerCheck";

const LI_R3_NEG_0X4000: u32 = 0x3860_c000;
const LI_R5_NEG_0X4000: u32 = 0x38a0_c000;
const LI_R9_1: u32 = 0x3920_0001;
const NOP: u32 = 0x6000_0000;

fn p1_word(address: u32, value: u32) -> PatchSite {
    PatchSite::word(address, value).when(BuildPredicate::Only(Build::P1))
}

fn p1_byte(address: u32, value: u8) -> PatchSite {
    PatchSite::byte(address, value).when(BuildPredicate::Only(Build::P1))
}

fn symbol(name: &'static str) -> Destination {
    Destination::Symbol(Cow::Borrowed(name))
}

/// The catalog of all built-in fixes, in application order.
pub fn builtin() -> Catalog {
    [
        // Rotation-controlled actors that apply the controller's starting rotation
        // on top of angles that already include it. -0x4000 is "up" relative to 0
        // radians, which is what the controller value gets replaced with.
        CatalogEntry::new(
            "unused-rotation-controlled-solid-platform",
            "C00000: daEnLiftRotHalf_c ignores the rotation controller's starting rotation",
        )
        .site(p1_word(0x80a5_d980, LI_R5_NEG_0X4000)),
        CatalogEntry::new(
            "rotation-controlled-event-deactivation-block",
            "C00001: daEnObjRotationBlock_c doubles the starting rotation",
        )
        .site(p1_word(0x80a7_b558, LI_R3_NEG_0X4000))
        .site(p1_word(0x80a7_b570, LI_R3_NEG_0X4000)),
        CatalogEntry::new(
            "rotation-controlled-coin",
            "C00002: daEnCoinAngle_c doubles the starting rotation",
        )
        .site(p1_word(0x809e_55f4, LI_R3_NEG_0X4000))
        .site(p1_word(0x809e_560c, LI_R3_NEG_0X4000)),
        CatalogEntry::new(
            "rotation-controlled-blocks",
            "C00003: rotation-controlled ? and brick blocks double the starting rotation",
        )
        .site(p1_word(0x809c_15c4, LI_R3_NEG_0X4000))
        .site(p1_word(0x809c_15dc, LI_R3_NEG_0X4000)),
        CatalogEntry::new(
            "upside-down-switch-position",
            "C00200: upside-down switches are moved left by 1/16 of a tile on spawn",
        )
        .site(p1_word(0x80a1_9a7c, NOP)),
        CatalogEntry::new(
            "special-exit-controller-yoshi-edible",
            "C00500: Yoshi can eat the invisible special exit controller",
        )
        .site(p1_byte(0x8093_9b8a, 0x7f)),
        CatalogEntry::new(
            "giant-floating-log-yoshi-edible",
            "C00502: Yoshi can eat the giant floating log",
        )
        .site(p1_byte(0x80ad_2e5e, 0x5f)),
        CatalogEntry::new(
            "save-data-region-check",
            "C00600: save files are rejected when they come from another region",
        )
        // Fourth game ID byte comparison in dNandThread_c::load()
        .site(p1_word(0x800c_f8a4, NOP))
        .site(p1_word(0x800c_f8a8, NOP))
        .site(p1_word(0x800c_f8ac, NOP))
        .site(p1_word(0x800c_f8b0, NOP))
        .site(p1_word(0x800c_f8b4, NOP)),
        CatalogEntry::new(
            "bowsers-castle-door-width",
            "C00700: the boss room door is not treated as a wide door when entering",
        )
        // cmplwi r0, 2
        .site(p1_word(0x8013_f41c, 0x2800_0002)),
        CatalogEntry::new(
            "falling-icicle-drillable",
            "C00800: falling icicles can be killed by a propeller spin-drill",
        )
        .site(p1_byte(0x80ad_0eba, 0xdf))
        .site(p1_byte(0x80ad_0ede, 0xdf)),
        CatalogEntry::new(
            "boo-circle-drillable",
            "C00801: Boo Circle boos can be killed by a propeller spin-drill",
        )
        .site(p1_byte(0x80ad_415a, 0x88)),
        CatalogEntry::new(
            "icicle-drillable-yoshi-edible",
            "C00802, C00505: icicles can be spin-drilled and eaten by Yoshi",
        )
        // Same attack bitfield byte for both fixes, in the 1x1 and 1x2 variants
        .site(p1_byte(0x80ac_fd0e, 0x5f))
        .site(p1_byte(0x80ac_fd32, 0x5f)),
        CatalogEntry::new(
            "bush-spawn-range",
            "C00900: bushes use a single tile spawn range and pop in late",
        )
        .site(p1_word(0x8030_dfc8, 64))
        .site(p1_word(0x8030_dfd4, 64)),
        CatalogEntry::new(
            "jumbo-ray-respawner-2-children",
            "C01000: the second Jumbo Ray respawner deletes rays that are still flying",
        )
        // bl 0x8085f5c0, deleting only waiting rays
        .site(p1_word(0x8086_0070, 0x4bff_f551))
        .site(p1_word(0x8086_00d4, 0x4bff_f4ed)),
        CatalogEntry::new(
            "direct-pipe-end-node",
            "C01100: direct pipes entered from the end start at the wrong path node",
        )
        // Computes the next path node index before the first node pointer
        .site(p1_word(0x8005_08fc, 0x5400_07ff))
        .site(p1_word(0x8005_0900, 0x4182_0014))
        .site(p1_word(0x8005_0904, 0xa0e3_0004))
        .site(p1_word(0x8005_0908, 0x3807_fffe))
        .site(p1_word(0x8005_090c, 0xb01f_042c))
        .site(p1_word(0x8005_0910, 0x4800_000c))
        .site(p1_word(0x8005_0914, 0x3800_0001))
        .site(p1_word(0x8005_0918, 0xb01f_042c))
        .site(p1_word(0x8005_091c, 0xa0a3_0002))
        .site(p1_word(0x8005_0920, 0xa89f_042c))
        .site(p1_word(0x8005_0924, 0x80c6_003c))
        .site(p1_word(0x8005_0928, 0x7c05_2214))
        .site(p1_word(0x8005_092c, 0x5400_2036))
        .site(p1_word(0x8005_0930, 0x7ca6_0214)),
        CatalogEntry::new(
            "star-coin-timed-event",
            "C01400: star coins with a timed event cancel P-Switch music when it expires",
        )
        .site(p1_word(0x80aa_a488, LI_R9_1)),
        CatalogEntry::new(
            "zone-enter-timed-event",
            "C01401: zone enter event controllers cancel P-Switch music when their timer expires",
        )
        .site(p1_word(0x807e_b210, LI_R9_1))
        .site(p1_word(0x807e_b248, LI_R9_1)),
        CatalogEntry::new(
            "chainer-timed-event",
            "C01402: chainer event controllers cancel P-Switch music when their timer expires",
        )
        .site(p1_word(0x807e_baa0, LI_R9_1))
        .site(p1_word(0x807e_bac8, LI_R9_1))
        .site(p1_word(0x807e_bb28, LI_R9_1))
        .site(p1_word(0x807e_bb50, LI_R9_1)),
        CatalogEntry::new(
            "red-ring-timed-event",
            "C01403: red rings with an event cancel P-Switch music when it expires",
        )
        .site(p1_word(0x80a9_3034, LI_R9_1)),
        CatalogEntry::new(
            "water-current-penguin-suit",
            "C01500: Penguin Mario ignores the water current speed and always drifts right",
        )
        // lfs f0, OFFSET(r3) -> lfs f5, OFFSET(r3)
        .site(p1_byte(0x8013_1401, 0xa3))
        .site(p1_word(0x8013_1404, NOP))
        .site(p1_word(0x8013_1408, NOP))
        .site(p1_word(0x8013_140c, NOP)),
        CatalogEntry::new(
            "world-map-hud-view-map",
            "C01600: world map button prompts change before they finish sliding away",
        )
        // Same address in P1, P2, E1, E2, J1 and J2. Fixed by Nintendo from K on.
        .site(
            PatchSite::branch(0x8001_22fc, symbol(WORLD_MAP_HUD_SYMBOL))
                .when(BuildPredicate::RevisionBefore(Revision::K)),
        ),
        CatalogEntry::new(
            "tilt-lift-invalid-player",
            "C01900: tilt lifts index controller data with player -1 when unclaimed",
        )
        .site(
            PatchSite::branch(0x8084_417c, symbol(TILT_LIFT_SYMBOL))
                .when(BuildPredicate::RevisionAtLeast(Revision::C)),
        ),
        CatalogEntry::new(
            "tile-block-allocation",
            "C02000: tile blocks are allocated for the whole zone, limiting level size",
        )
        // li r5, 1 / sth r5, 0xc08(r3) / blr
        .site(p1_word(0x8008_37c0, 0x38a0_0001))
        .site(p1_word(0x8008_37c4, 0xb0a3_0c08))
        .site(p1_word(0x8008_37c8, 0x4e80_0020))
        // b 0x1bc
        .site(p1_word(0x8008_38b8, 0x4800_01bc)),
    ]
    .into_iter()
    .collect()
}
