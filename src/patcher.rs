//! Applies a catalog of patches to the game image.

use byteorder::{ByteOrder, BE};
use fxhash::FxHashSet;

use crate::{
    build::{identify_build, Build, BuildCode},
    catalog::{Catalog, CatalogEntry, PatchSite},
    memory::{MemoryError, PatchableMemory},
    symbols::SymbolTable,
};

/// Which build(s) the patch set is prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Keep every site and decide what applies by identifying the image.
    #[default]
    Dynamic,
    /// Keep only the sites for this build and apply them unconditionally.
    Fixed(Build),
}

#[derive(Debug, Clone, Default)]
pub struct PatchConfig {
    pub target: Target,
    /// Names of catalog entries to leave out.
    pub disabled: FxHashSet<String>,
    /// Skip sites whose current contents differ from their expected original.
    pub verify_original: bool,
}

impl PatchConfig {
    /// Builds the catalog to apply from the full one.
    pub fn select(&self, catalog: &Catalog) -> Catalog {
        for name in &self.disabled {
            if !catalog.contains(name) {
                log::warn!("Disabled fix '{name}' is not in the catalog");
            }
        }

        let enabled = catalog.filter(|e| !self.disabled.contains(&e.name));
        match self.target {
            Target::Dynamic => enabled,
            Target::Fixed(build) => enabled.specialize(build),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("'{entry}' branches to undefined symbol '{symbol}'")]
    UnresolvedSymbol { entry: String, symbol: String },
}

/// Outcome of [`Patcher::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Build the sites were selected for.
    pub build: BuildCode,
    pub applied: usize,
    /// Sites filtered out or not matching the build.
    pub skipped: usize,
    /// Sites not applied because the original contents did not match.
    pub mismatched: Vec<(String, u32)>,
}

pub struct Patcher {
    catalog: Catalog,
    symbols: SymbolTable,
    config: PatchConfig,
}

impl Patcher {
    /// Prepares `catalog` according to `config`.
    pub fn new(catalog: &Catalog, config: PatchConfig) -> Self {
        Self {
            catalog: config.select(catalog),
            symbols: SymbolTable::new(),
            config,
        }
    }

    pub fn with_symbols(mut self, symbols: SymbolTable) -> Self {
        self.symbols = symbols;
        self
    }

    /// The catalog after target selection and disabled fixes were removed.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    /// Build the selected sites will be matched against for `memory`.
    ///
    /// Identifies the image for [`Target::Dynamic`]; a fixed target is taken as is,
    /// with a warning if the image looks like a different build.
    pub fn build_for<M: PatchableMemory + ?Sized>(&self, memory: &M) -> BuildCode {
        let identified = identify_build(memory);
        match self.config.target {
            Target::Dynamic => identified,
            Target::Fixed(build) => {
                if identified != build.code() {
                    log::warn!(
                        "Patching for {build}, but the image was identified as {identified}"
                    );
                }
                build.code()
            }
        }
    }

    /// Applies every selected site that matches the build of `memory`.
    pub fn apply<M: PatchableMemory + ?Sized>(
        &self,
        memory: &mut M,
    ) -> Result<ApplyReport, PatchError> {
        self.apply_filtered(memory, |_, _| true)
    }

    /// Like [`Patcher::apply`], but only for the sites `filter` accepts.
    ///
    /// Every selected site is encoded before the first write, so an undefined
    /// symbol fails the whole application with `memory` left untouched.
    pub fn apply_filtered<M: PatchableMemory + ?Sized>(
        &self,
        memory: &mut M,
        mut filter: impl FnMut(&CatalogEntry, &PatchSite) -> bool,
    ) -> Result<ApplyReport, PatchError> {
        let build = self.build_for(&*memory);
        log::debug!("Applying {} fixes for {build}", self.catalog.len());

        let mut report = ApplyReport {
            build,
            ..Default::default()
        };

        let mut selected = Vec::new();
        for entry in self.catalog.iter() {
            for site in &entry.sites {
                if !filter(entry, site) || !site.predicate.matches(build) {
                    report.skipped += 1;
                    continue;
                }

                let bytes = site
                    .encode(&self.symbols)
                    .map_err(|e| PatchError::UnresolvedSymbol {
                        entry: entry.name.clone(),
                        symbol: e.0,
                    })?;
                selected.push((entry, site, bytes));
            }
        }

        for (entry, site, bytes) in selected {
            if self.config.verify_original && !self.original_matches(&*memory, site)? {
                log::warn!(
                    "'{}': unexpected contents at {:08x}, not patching",
                    entry.name,
                    site.address
                );
                report.mismatched.push((entry.name.clone(), site.address));
                continue;
            }

            write_site(memory, site.address, &bytes)?;
            log::trace!("'{}': wrote {bytes:02x?} at {:08x}", entry.name, site.address);
            report.applied += 1;
        }

        log::debug!(
            "Applied {} sites, skipped {}, {} mismatched",
            report.applied,
            report.skipped,
            report.mismatched.len()
        );
        Ok(report)
    }

    fn original_matches<M: PatchableMemory + ?Sized>(
        &self,
        memory: &M,
        site: &PatchSite,
    ) -> Result<bool, MemoryError> {
        let Some(expected) = site.original_bytes() else {
            return Ok(true);
        };
        let mut current = vec![0; expected.len()];
        memory.read(site.address, &mut current)?;
        Ok(current == expected)
    }
}

/// Words go out as a single aligned store, so that instructions are never
/// observed half written.
fn write_site<M: PatchableMemory + ?Sized>(
    memory: &mut M,
    address: u32,
    bytes: &[u8],
) -> Result<(), MemoryError> {
    match bytes.len() {
        4 => memory.write_u32(address, BE::read_u32(bytes)),
        _ => memory.write(address, bytes),
    }
}
