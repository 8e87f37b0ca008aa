//! Export of a patch set as a Riivolution XML document.
//!
//! Riivolution applies `<memory>` patches blindly after the game is loaded, so
//! only unconditional sites can be expressed. Specialize the catalog for a
//! single build (see [`Catalog::specialize`]) before exporting it.

use std::fmt::Write;

use crate::{
    build::Region,
    catalog::{BuildPredicate, Catalog},
    patcher::PatchError,
    symbols::SymbolTable,
};

/// Disc ID prefix of every release of the game.
pub const GAME_ID: &str = "SMN";

pub const PATCH_ID: &str = "nsmbw_updated";

#[derive(Debug, Clone)]
pub struct RiivolutionXml {
    pub title: String,
    /// Value of the `root` attribute. Usually starts with "/".
    pub root: String,
    pub regions: Vec<Region>,
    /// `(external, disc)` folder replacements.
    pub folders: Vec<(String, String)>,
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

impl RiivolutionXml {
    pub fn new(title: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            root: root.into(),
            regions: Vec::new(),
            folders: Vec::new(),
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    pub fn folder(mut self, external: impl Into<String>, disc: impl Into<String>) -> Self {
        self.folders.push((external.into(), disc.into()));
        self
    }

    /// Renders the document, with one `<memory>` element per unconditional site.
    ///
    /// Gated sites are left out with a warning.
    pub fn render(&self, catalog: &Catalog, symbols: &SymbolTable) -> Result<String, PatchError> {
        let title = escape(&self.title);
        let mut xml = String::new();

        // Writing to a String cannot fail
        let _ = writeln!(
            xml,
            r#"<wiidisc version="1" shiftfiles="true" root="{}" log="true">"#,
            escape(&self.root)
        );
        let _ = writeln!(xml, r#"    <id game="{GAME_ID}">"#);
        for region in &self.regions {
            let _ = writeln!(xml, r#"        <region type="{}"/>"#, region.letter());
        }
        let _ = writeln!(xml, "    </id>");
        let _ = writeln!(xml, "    <options>");
        let _ = writeln!(xml, r#"        <section name="{title}">"#);
        let _ = writeln!(
            xml,
            r#"            <option name="{title}" id="{PATCH_ID}" default="1">"#
        );
        let _ = writeln!(
            xml,
            r#"                <choice name="Enabled"><patch id="{PATCH_ID}"/></choice>"#
        );
        let _ = writeln!(xml, "            </option>");
        let _ = writeln!(xml, "        </section>");
        let _ = writeln!(xml, "    </options>");
        let _ = writeln!(xml, r#"    <patch id="{PATCH_ID}">"#);

        for (external, disc) in &self.folders {
            let _ = writeln!(
                xml,
                r#"        <folder external="{}" disc="{}" create="true" />"#,
                escape(external),
                escape(disc)
            );
        }

        for entry in catalog.iter() {
            let _ = writeln!(xml, "        <!-- {} -->", escape(&entry.name));
            for site in &entry.sites {
                if site.predicate != BuildPredicate::Always {
                    log::warn!(
                        "'{}': site at {:08x} only applies to {}, leaving it out",
                        entry.name,
                        site.address,
                        site.predicate
                    );
                    continue;
                }

                let value = site
                    .encode(symbols)
                    .map_err(|e| PatchError::UnresolvedSymbol {
                        entry: entry.name.clone(),
                        symbol: e.0,
                    })?;

                let _ = write!(
                    xml,
                    r#"        <memory offset="0x{:08x}" value="{}""#,
                    site.address,
                    hex(&value)
                );
                if let Some(original) = site.original_bytes() {
                    let _ = write!(xml, r#" original="{}""#, hex(&original));
                }
                let _ = writeln!(xml, " />");
            }
        }

        let _ = writeln!(xml, "    </patch>");
        let _ = writeln!(xml, "</wiidisc>");
        Ok(xml)
    }
}
