use std::error::Error;

use nsmbw_patcher::{
    build::{DISAMBIGUATION_ADDRESS, SIGNATURE_ADDRESS},
    identify_build, Build, BuildCode, Region, Revision, SparseMemory,
};
use simplelog::*;

const SIGNATURES: &[(Build, u32, Option<u8>)] = &[
    (Build::P1, 0x4082_0030, None),
    (Build::P2, 0x4082_0038, None),
    (Build::E1, 0x4800_0465, None),
    (Build::E2, 0x2c03_0000, None),
    (Build::J1, 0x4800_00b4, None),
    (Build::J2, 0x4082_000c, None),
    (Build::K, 0x38a0_0001, Some(0xc8)),
    (Build::W, 0x38a0_0001, Some(0xac)),
    (Build::C, 0x4182_000c, None),
];

fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

fn image(signature: u32, disambiguation: Option<u8>) -> SparseMemory {
    let memory = SparseMemory::new().with_u32(SIGNATURE_ADDRESS, signature);
    match disambiguation {
        Some(b) => memory.with_bytes(DISAMBIGUATION_ADDRESS, &[b]),
        None => memory,
    }
}

#[test]
fn identifies_all_builds() {
    init_logger();

    for &(build, signature, disambiguation) in SIGNATURES {
        let code = identify_build(&image(signature, disambiguation));
        assert_eq!(code.build(), Some(build), "signature {signature:08x}");
        assert_eq!(code.region(), Some(build.region()));
        assert_eq!(code.revision(), Some(build.revision()));
    }
}

#[test]
fn unknown_signatures() {
    init_logger();

    for signature in [0, 0x6000_0000, 0x4082_0031, 0xffff_ffff, 0x38a0_0000] {
        assert_eq!(identify_build(&image(signature, Some(0xc8))), BuildCode::UNKNOWN);
    }

    // Nothing mapped at all
    assert_eq!(identify_build(&SparseMemory::new()), BuildCode::UNKNOWN);
}

#[test]
fn shared_signature_needs_known_byte() {
    init_logger();

    for byte in (0..=u8::MAX).filter(|b| !matches!(b, 0xc8 | 0xac)) {
        assert_eq!(
            identify_build(&image(0x38a0_0001, Some(byte))),
            BuildCode::UNKNOWN,
            "byte {byte:02x}"
        );
    }

    // Disambiguation byte not readable
    assert_eq!(identify_build(&image(0x38a0_0001, None)), BuildCode::UNKNOWN);
}

#[test]
fn revisions_are_chronological() {
    let chronological = [
        Revision::V1,
        Revision::V2,
        Revision::K,
        Revision::W,
        Revision::C,
    ];
    for (i, a) in chronological.iter().enumerate() {
        for (j, b) in chronological.iter().enumerate() {
            assert_eq!(a.cmp(b), i.cmp(&j), "{a:?} vs {b:?}");
        }
    }

    // Build::ALL is ordered by revision
    for pair in Build::ALL.windows(2) {
        assert!(pair[0].revision() <= pair[1].revision());
    }
    assert!(Build::P1.revision() < Build::E2.revision());
    assert!(Build::J2.revision() < Build::K.revision());
}

#[test]
fn build_codes() -> Result<(), Box<dyn Error>> {
    assert_eq!(BuildCode::UNKNOWN.raw(), 0);
    assert!(!BuildCode::UNKNOWN.is_known());
    assert_eq!(BuildCode::UNKNOWN.build(), None);

    let mut seen = Vec::new();
    for build in Build::ALL {
        let code = build.code();
        assert!(code.is_known());
        assert!(!seen.contains(&code), "duplicate code for {build}");
        seen.push(code);

        assert_eq!(BuildCode::from_raw(code.raw()), code);
        assert_eq!(build.name().parse::<Build>()?, build);
        assert_eq!(build.name().to_lowercase().parse::<Build>()?, build);
    }

    assert_eq!(BuildCode::new(Region::E, Revision::V2), Build::E2.code());
    assert_eq!(Build::W.code().region(), Some(Region::W));
    assert!("P3".parse::<Build>().is_err());
    Ok(())
}
