use nsmbw_patcher::{
    branch::{encode_branch, install_branch, BRANCH_OPCODE},
    build::{DISAMBIGUATION_ADDRESS, SIGNATURE_ADDRESS},
    install_conditional_branch, Build, BuildCode, PatchableMemory, Revision, SparseMemory,
};

const SOURCE: u32 = 0x8005_0000;
const DESTINATION: u32 = 0x8005_0100;

fn p1_image() -> SparseMemory {
    SparseMemory::new()
        .with_u32(SIGNATURE_ADDRESS, 0x4082_0030)
        .with_u32(SOURCE - 4, 0x3800_0000)
        .with_u32(SOURCE, 0x4e80_0020)
        .with_u32(SOURCE + 4, 0x3860_0000)
}

#[test]
fn forward_branch() {
    assert_eq!(encode_branch(SOURCE, DESTINATION).raw(), BRANCH_OPCODE | 0x100);
    assert_eq!(encode_branch(SOURCE, DESTINATION).raw(), 0x4800_0100);
    assert_eq!(encode_branch(SOURCE, SOURCE).raw(), BRANCH_OPCODE);
}

#[test]
fn backward_branch() {
    // -0x100 = 0xffffff00, masked to 0x03ffff00
    assert_eq!(encode_branch(DESTINATION, SOURCE).raw(), 0x4bff_ff00);
    // -4 = 0xfffffffc, masked to 0x03fffffc
    assert_eq!(encode_branch(SOURCE, SOURCE - 4).raw(), 0x4bff_fffc);
}

#[test]
fn out_of_range_branch_truncates() {
    // 0x04000000 has no bits inside the displacement field
    assert_eq!(
        encode_branch(0x8000_0000, 0x8400_0000).raw(),
        BRANCH_OPCODE
    );
    // Low two bits are dropped as well
    assert_eq!(encode_branch(SOURCE, DESTINATION + 3).raw(), 0x4800_0100);
}

#[test]
fn false_predicate_writes_nothing() {
    let mut memory = p1_image();
    let before = memory.contents().clone();

    let installed =
        install_conditional_branch(&mut memory, |_| false, SOURCE, DESTINATION).unwrap();

    assert!(!installed);
    assert!(memory.writes().is_empty());
    assert_eq!(memory.contents(), &before);
}

#[test]
fn unknown_build_writes_nothing() {
    let mut memory = SparseMemory::new()
        .with_u32(SIGNATURE_ADDRESS, 0x1234_5678)
        .with_u32(SOURCE, 0x4e80_0020);

    let installed =
        install_conditional_branch(&mut memory, |_| true, SOURCE, DESTINATION).unwrap();

    assert!(!installed);
    assert!(memory.writes().is_empty());
}

#[test]
fn true_predicate_writes_one_word() {
    let mut memory = p1_image();
    let before = memory.contents().clone();

    let mut seen = None;
    let installed = install_conditional_branch(
        &mut memory,
        |build| {
            seen = Some(build);
            build.revision() < Some(Revision::K)
        },
        SOURCE,
        DESTINATION,
    )
    .unwrap();

    assert!(installed);
    assert_eq!(seen, Some(Build::P1.code()));
    assert_eq!(memory.writes(), &[(SOURCE, vec![0x48, 0x00, 0x01, 0x00])]);
    assert_eq!(memory.read_u32(SOURCE).unwrap(), 0x4800_0100);

    // Everything else is untouched
    for (address, byte) in &before {
        if !(SOURCE..SOURCE + 4).contains(address) {
            assert_eq!(memory.contents()[address], *byte, "{address:08x}");
        }
    }
    assert_eq!(memory.contents().len(), before.len());
}

#[test]
fn predicate_sees_shared_signature_builds() {
    for (byte, build) in [(0xc8, Build::K), (0xac, Build::W)] {
        let mut memory = SparseMemory::new()
            .with_u32(SIGNATURE_ADDRESS, 0x38a0_0001)
            .with_bytes(DISAMBIGUATION_ADDRESS, &[byte])
            .with_u32(SOURCE, 0);

        let installed = install_conditional_branch(
            &mut memory,
            |code| code == BuildCode::from(Build::W),
            SOURCE,
            DESTINATION,
        )
        .unwrap();
        assert_eq!(installed, build == Build::W);
    }
}

#[test]
fn installation_is_idempotent() {
    let mut memory = p1_image();
    install_conditional_branch(&mut memory, |_| true, SOURCE, DESTINATION).unwrap();
    let first = memory.read_u32(SOURCE).unwrap();
    install_conditional_branch(&mut memory, |_| true, SOURCE, DESTINATION).unwrap();
    let second = memory.read_u32(SOURCE).unwrap();

    assert_eq!(first, second);
    assert_eq!(memory.writes().len(), 2);
    assert_eq!(memory.writes()[0], memory.writes()[1]);
}

#[test]
fn unconditional_install() {
    let mut memory = SparseMemory::new();
    install_branch(&mut memory, SOURCE, encode_branch(SOURCE, DESTINATION).with_link()).unwrap();
    assert_eq!(memory.read_u32(SOURCE).unwrap(), 0x4800_0101);
}
