use std::borrow::Cow;

use nsmbw_patcher::{
    catalog::{fixes, CatalogError, Destination},
    symbols::SymbolTable,
    Build, BuildCode, BuildPredicate, Catalog, CatalogEntry, PatchSite, Region, Revision,
};

fn symbol(name: &'static str) -> Destination {
    Destination::Symbol(Cow::Borrowed(name))
}

#[test]
fn builtin_catalog_is_valid() {
    let catalog = fixes::builtin();
    assert!(!catalog.is_empty());
    catalog.validate().unwrap();

    for build in Build::ALL {
        catalog.specialize(build).validate().unwrap();
    }

    let save_data = catalog.get("save-data-region-check").unwrap();
    assert_eq!(save_data.sites.len(), 5);
    assert_eq!(save_data.sites[4].address, 0x800c_f8b4);
    assert_eq!(catalog.get("direct-pipe-end-node").unwrap().sites.len(), 14);
    for name in ["zone-enter-timed-event", "chainer-timed-event", "icicle-drillable-yoshi-edible"] {
        let entry = catalog.get(name).unwrap();
        assert!(entry.sites.iter().all(|s| s.predicate == BuildPredicate::Only(Build::P1)));
    }
}

#[test]
fn builtin_gated_branches() {
    let catalog = fixes::builtin();

    let hud = catalog.get("world-map-hud-view-map").unwrap();
    assert!(hud.sites[0].predicate.admits(Build::J2));
    assert!(!hud.sites[0].predicate.admits(Build::K));

    let tilt = catalog.get("tilt-lift-invalid-player").unwrap();
    assert!(tilt.sites[0].predicate.admits(Build::C));
    assert!(!tilt.sites[0].predicate.admits(Build::W));

    assert!(catalog.specialize(Build::K).get("world-map-hud-view-map").is_none());
    assert!(catalog.specialize(Build::C).get("tilt-lift-invalid-player").is_some());
}

#[test]
fn predicates() {
    let unknown = BuildCode::UNKNOWN;
    assert!(BuildPredicate::Always.matches(unknown));
    for predicate in [
        BuildPredicate::Only(Build::P1),
        BuildPredicate::AnyOf(Build::ALL.to_vec()),
        BuildPredicate::Region(Region::P),
        BuildPredicate::RevisionBefore(Revision::C),
        BuildPredicate::RevisionAtLeast(Revision::V1),
    ] {
        assert!(!predicate.matches(unknown), "{predicate}");
    }

    assert!(BuildPredicate::Only(Build::E1).admits(Build::E1));
    assert!(!BuildPredicate::Only(Build::E1).admits(Build::E2));
    assert!(BuildPredicate::AnyOf(vec![Build::K, Build::W]).admits(Build::W));
    assert!(BuildPredicate::Region(Region::J).admits(Build::J2));
    assert!(!BuildPredicate::Region(Region::J).admits(Build::P2));
    assert!(BuildPredicate::RevisionBefore(Revision::K).admits(Build::E2));
    assert!(!BuildPredicate::RevisionBefore(Revision::K).admits(Build::K));
    assert!(BuildPredicate::RevisionAtLeast(Revision::W).admits(Build::C));
    assert!(!BuildPredicate::RevisionAtLeast(Revision::W).admits(Build::K));
}

#[test]
fn duplicate_names_rejected() {
    let mut catalog = Catalog::new();
    catalog.insert(CatalogEntry::new("a", "first")).unwrap();
    assert_eq!(
        catalog.insert(CatalogEntry::new("a", "second")),
        Err(CatalogError::DuplicateEntry("a".to_owned()))
    );
    assert_eq!(catalog.get("a").unwrap().description, "first");
}

#[test]
fn overlapping_sites_rejected() {
    let catalog: Catalog = [
        CatalogEntry::new("word", "").site(PatchSite::word(0x8000_1000, 0x6000_0000)),
        CatalogEntry::new("byte", "").site(PatchSite::byte(0x8000_1002, 0xff)),
    ]
    .into_iter()
    .collect();

    assert_eq!(
        catalog.validate(),
        Err(CatalogError::Overlap {
            first: "word".to_owned(),
            second: "byte".to_owned(),
            address: 0x8000_1002
        })
    );
}

#[test]
fn disjoint_builds_may_share_addresses() {
    let catalog: Catalog = [
        CatalogEntry::new("old", "").site(
            PatchSite::word(0x8000_1000, 1).when(BuildPredicate::RevisionBefore(Revision::K)),
        ),
        CatalogEntry::new("new", "").site(
            PatchSite::word(0x8000_1000, 2).when(BuildPredicate::RevisionAtLeast(Revision::K)),
        ),
        CatalogEntry::new("adjacent", "").site(PatchSite::word(0x8000_1004, 3)),
    ]
    .into_iter()
    .collect();
    catalog.validate().unwrap();

    // ...but not with an ungated site
    let catalog: Catalog = [
        CatalogEntry::new("old", "")
            .site(PatchSite::word(0x8000_1000, 1).when(BuildPredicate::Only(Build::P1))),
        CatalogEntry::new("all", "").site(PatchSite::byte(0x8000_1003, 2)),
    ]
    .into_iter()
    .collect();
    assert!(matches!(catalog.validate(), Err(CatalogError::Overlap { .. })));
}

#[test]
fn misaligned_word_rejected() {
    let catalog: Catalog = [CatalogEntry::new("bad", "")
        .site(PatchSite::branch(0x8000_1002, Destination::Address(0x8000_2000)))]
    .into_iter()
    .collect();

    assert_eq!(
        catalog.validate(),
        Err(CatalogError::Misaligned {
            entry: "bad".to_owned(),
            address: 0x8000_1002
        })
    );
}

#[test]
fn specialize_makes_sites_unconditional() {
    let catalog: Catalog = [
        CatalogEntry::new("mixed", "")
            .site(PatchSite::word(0x8000_1000, 1).when(BuildPredicate::Only(Build::P1)))
            .site(PatchSite::word(0x8000_2000, 2).when(BuildPredicate::Only(Build::E1))),
        CatalogEntry::new("east", "")
            .site(PatchSite::byte(0x8000_3000, 3).when(BuildPredicate::Region(Region::K))),
    ]
    .into_iter()
    .collect();

    let p1 = catalog.specialize(Build::P1);
    assert_eq!(p1.names().collect::<Vec<_>>(), ["mixed"]);
    let sites = &p1.get("mixed").unwrap().sites;
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].address, 0x8000_1000);
    assert_eq!(sites[0].predicate, BuildPredicate::Always);

    assert_eq!(catalog.specialize(Build::K).names().collect::<Vec<_>>(), ["east"]);
    assert!(catalog.specialize(Build::C).is_empty());
}

#[test]
fn site_encoding() {
    let symbols: SymbolTable = [("routine", 0x8000_0100u32)].into_iter().collect();

    assert_eq!(
        PatchSite::word(0x8000_0000, 0x6000_0000).encode(&symbols),
        Ok(vec![0x60, 0, 0, 0])
    );
    assert_eq!(PatchSite::byte(0x8000_0001, 0xa3).encode(&symbols), Ok(vec![0xa3]));
    assert_eq!(
        PatchSite::branch(0x8000_0000, symbol("routine")).encode(&symbols),
        Ok(vec![0x48, 0, 0x01, 0])
    );
    assert_eq!(
        PatchSite::call(0x8000_0200, symbol("routine")).encode(&symbols),
        Ok(vec![0x4b, 0xff, 0xff, 0x01])
    );
    assert_eq!(
        PatchSite::branch(0x8000_0000, symbol("missing"))
            .encode(&symbols)
            .unwrap_err()
            .0,
        "missing"
    );

    assert_eq!(
        PatchSite::byte(0x8000_0001, 0xa3).expecting(0x83).original_bytes(),
        Some(vec![0x83])
    );
    assert_eq!(
        PatchSite::word(0x8000_0000, 0).expecting(0x4e80_0020).original_bytes(),
        Some(vec![0x4e, 0x80, 0x00, 0x20])
    );
}
