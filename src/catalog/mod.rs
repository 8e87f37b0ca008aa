//! Declarative descriptions of the patches to apply to the game.

use std::{borrow::Cow, fmt};

use indexmap::IndexMap;

use crate::{
    branch::{encode_branch, encode_branch_checked},
    build::{Build, BuildCode, Region, Revision},
    symbols::SymbolTable,
};

pub mod fixes;

/// Which builds a [`PatchSite`] applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPredicate {
    /// No version gating. Applied even when the build is not recognized.
    Always,
    Only(Build),
    AnyOf(Vec<Build>),
    Region(Region),
    /// Builds released strictly before the given revision.
    RevisionBefore(Revision),
    RevisionAtLeast(Revision),
}

impl BuildPredicate {
    /// Whether a site gated by this predicate should be applied to `build`.
    ///
    /// Only [`BuildPredicate::Always`] matches [`BuildCode::UNKNOWN`].
    pub fn matches(&self, build: BuildCode) -> bool {
        if matches!(self, BuildPredicate::Always) {
            return true;
        }
        if !build.is_known() {
            return false;
        }

        match self {
            BuildPredicate::Always => true,
            BuildPredicate::Only(b) => b.code() == build,
            BuildPredicate::AnyOf(bs) => bs.iter().any(|b| b.code() == build),
            BuildPredicate::Region(r) => build.region() == Some(*r),
            BuildPredicate::RevisionBefore(r) => build.revision().is_some_and(|v| v < *r),
            BuildPredicate::RevisionAtLeast(r) => build.revision().is_some_and(|v| v >= *r),
        }
    }

    pub fn admits(&self, build: Build) -> bool {
        self.matches(build.code())
    }
}

impl fmt::Display for BuildPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildPredicate::Always => f.write_str("all builds"),
            BuildPredicate::Only(b) => write!(f, "{b}"),
            BuildPredicate::AnyOf(bs) => {
                let names: Vec<_> = bs.iter().map(|b| b.name()).collect();
                f.write_str(&names.join(", "))
            }
            BuildPredicate::Region(r) => write!(f, "region {}", r.letter()),
            BuildPredicate::RevisionBefore(r) => write!(f, "revisions before {r:?}"),
            BuildPredicate::RevisionAtLeast(r) => write!(f, "revision {r:?} and later"),
        }
    }
}

/// Where a branch payload jumps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Address(u32),
    /// An injected routine, whose address is only known once it has been linked.
    Symbol(Cow<'static, str>),
}

impl Destination {
    pub fn resolve(&self, symbols: &SymbolTable) -> Option<u32> {
        match self {
            Destination::Address(a) => Some(*a),
            Destination::Symbol(name) => symbols.get(name),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Address(a) => write!(f, "{a:08x}"),
            Destination::Symbol(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Word(u32),
    Byte(u8),
    /// `b destination`
    Branch(Destination),
    /// `bl destination`
    Call(Destination),
}

impl Payload {
    /// Number of bytes overwritten.
    pub fn len(&self) -> usize {
        match self {
            Payload::Byte(_) => 1,
            _ => 4,
        }
    }

    pub fn destination(&self) -> Option<&Destination> {
        match self {
            Payload::Branch(d) | Payload::Call(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("symbol '{0}' is not defined")]
pub struct UnresolvedSymbol(pub String);

/// A single write to the game image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSite {
    pub address: u32,
    pub payload: Payload,
    /// Value expected at `address` before patching, in the payload's width.
    pub original: Option<u32>,
    pub predicate: BuildPredicate,
}

impl PatchSite {
    pub fn new(address: u32, payload: Payload) -> Self {
        Self {
            address,
            payload,
            original: None,
            predicate: BuildPredicate::Always,
        }
    }

    pub fn word(address: u32, value: u32) -> Self {
        Self::new(address, Payload::Word(value))
    }

    pub fn byte(address: u32, value: u8) -> Self {
        Self::new(address, Payload::Byte(value))
    }

    pub fn branch(address: u32, destination: Destination) -> Self {
        Self::new(address, Payload::Branch(destination))
    }

    pub fn call(address: u32, destination: Destination) -> Self {
        Self::new(address, Payload::Call(destination))
    }

    pub fn expecting(mut self, original: u32) -> Self {
        self.original = Some(original);
        self
    }

    pub fn when(mut self, predicate: BuildPredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Exclusive end of the written range.
    pub fn end(&self) -> u64 {
        self.address as u64 + self.len() as u64
    }

    pub fn original_bytes(&self) -> Option<Vec<u8>> {
        self.original.map(|o| match self.payload {
            Payload::Byte(_) => vec![o as u8],
            _ => o.to_be_bytes().to_vec(),
        })
    }

    /// Bytes to write at [`PatchSite::address`].
    pub fn encode(&self, symbols: &SymbolTable) -> Result<Vec<u8>, UnresolvedSymbol> {
        let word = match &self.payload {
            Payload::Byte(b) => return Ok(vec![*b]),
            Payload::Word(w) => *w,
            Payload::Branch(d) | Payload::Call(d) => {
                let destination = d
                    .resolve(symbols)
                    .ok_or_else(|| UnresolvedSymbol(d.to_string()))?;
                let branch = encode_branch(self.address, destination);
                match self.payload {
                    Payload::Call(_) => branch.with_link().raw(),
                    _ => branch.raw(),
                }
            }
        };
        Ok(word.to_be_bytes().to_vec())
    }
}

/// A documented fix, made of one or more patch sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub sites: Vec<PatchSite>,
}

impl CatalogEntry {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            sites: Vec::new(),
        }
    }

    pub fn site(mut self, site: PatchSite) -> Self {
        self.sites.push(site);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog already contains an entry named '{0}'")]
    DuplicateEntry(String),
    #[error("'{first}' and '{second}' both write to {address:08x}")]
    Overlap {
        first: String,
        second: String,
        address: u32,
    },
    #[error("'{entry}' writes a word to unaligned address {address:08x}")]
    Misaligned { entry: String, address: u32 },
}

/// Ordered set of catalog entries, keyed by name.
///
/// Entries are applied in insertion order, and every entry must own a disjoint
/// set of addresses for any given build. Use [`Catalog::validate`] to check this.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: IndexMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CatalogEntry) -> Result<(), CatalogError> {
        if self.entries.contains_key(&entry.name) {
            return Err(CatalogError::DuplicateEntry(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Sites branching to a symbol that `symbols` does not define.
    pub fn unresolved<'a>(
        &'a self,
        symbols: &'a SymbolTable,
    ) -> impl Iterator<Item = (&'a CatalogEntry, &'a PatchSite)> + 'a {
        self.iter().flat_map(move |entry| {
            entry
                .sites
                .iter()
                .filter(move |site| {
                    site.payload
                        .destination()
                        .is_some_and(|d| d.resolve(symbols).is_none())
                })
                .map(move |site| (entry, site))
        })
    }

    /// Copy of this catalog with only the entries `keep` returns true for.
    pub fn filter(&self, mut keep: impl FnMut(&CatalogEntry) -> bool) -> Catalog {
        Catalog {
            entries: self
                .entries
                .iter()
                .filter(|(_, e)| keep(e))
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    /// Copy of this catalog containing only the sites that apply to `build`,
    /// all made unconditional. Entries left without sites are dropped.
    pub fn specialize(&self, build: Build) -> Catalog {
        let entries = self
            .entries
            .iter()
            .filter_map(|(name, entry)| {
                let sites: Vec<_> = entry
                    .sites
                    .iter()
                    .filter(|s| s.predicate.admits(build))
                    .map(|s| PatchSite {
                        predicate: BuildPredicate::Always,
                        ..s.clone()
                    })
                    .collect();

                (!sites.is_empty()).then(|| {
                    (
                        name.clone(),
                        CatalogEntry {
                            sites,
                            ..entry.clone()
                        },
                    )
                })
            })
            .collect();

        Catalog { entries }
    }

    /// Checks that no two sites which can be applied to the same build write to
    /// overlapping bytes, and that word-sized writes are aligned.
    ///
    /// Branches with a known destination that is out of range are logged, but
    /// not rejected: they are encoded with the displacement truncated.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut sites: Vec<(&str, &PatchSite)> = self
            .entries
            .values()
            .flat_map(|e| e.sites.iter().map(move |s| (e.name.as_str(), s)))
            .collect();

        for &(entry, site) in &sites {
            if site.len() == 4 && site.address & 3 != 0 {
                return Err(CatalogError::Misaligned {
                    entry: entry.to_owned(),
                    address: site.address,
                });
            }

            if let Some(Destination::Address(destination)) = site.payload.destination() {
                if let Err(e) = encode_branch_checked(site.address, *destination) {
                    log::warn!("'{entry}': {e}");
                }
            }
        }

        sites.sort_by_key(|(_, s)| s.address);
        for (i, &(first, a)) in sites.iter().enumerate() {
            for &(second, b) in sites[i + 1..]
                .iter()
                .take_while(|(_, b)| (b.address as u64) < a.end())
            {
                let shared_build = Build::ALL
                    .into_iter()
                    .any(|build| a.predicate.admits(build) && b.predicate.admits(build));
                let both_ungated = a.predicate == BuildPredicate::Always
                    && b.predicate == BuildPredicate::Always;

                if shared_build || both_ungated {
                    return Err(CatalogError::Overlap {
                        first: first.to_owned(),
                        second: second.to_owned(),
                        address: b.address,
                    });
                }
            }
        }

        Ok(())
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    /// Later entries replace earlier ones with the same name.
    fn from_iter<T: IntoIterator<Item = CatalogEntry>>(iter: T) -> Self {
        Catalog {
            entries: iter.into_iter().map(|e| (e.name.clone(), e)).collect(),
        }
    }
}
