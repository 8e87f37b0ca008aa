//! Addresses of injected routines that branch patches jump to.

use std::str::FromStr;

use fxhash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: expected '<name> <address>', got '{text}'")]
pub struct SymbolParseError {
    pub line: usize,
    pub text: String,
}

/// Maps symbol names to load addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: FxHashMap<String, u32>,
}

/// Parses `0x`-prefixed hex, or bare hex as found in linker maps.
pub fn parse_address(text: &str) -> Option<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).ok()
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: u32) -> Option<u32> {
        self.symbols.insert(name.into(), address)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Parses a single `NAME=ADDRESS` definition.
    pub fn parse_definition(text: &str) -> Option<(String, u32)> {
        let (name, address) = text.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_owned(), parse_address(address.trim())?))
    }
}

impl FromStr for SymbolTable {
    type Err = SymbolParseError;

    /// One `NAME ADDRESS` pair per line. Blank lines and `#` comments are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut table = SymbolTable::new();
        for (i, raw_line) in s.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let parsed = match (parts.next(), parts.next(), parts.next()) {
                (Some(name), Some(address), None) => parse_address(address).map(|a| (name, a)),
                _ => None,
            };
            let Some((name, address)) = parsed else {
                return Err(SymbolParseError {
                    line: i + 1,
                    text: raw_line.to_owned(),
                });
            };

            if let Some(previous) = table.insert(name, address) {
                log::warn!("Symbol {name} redefined ({previous:08x} -> {address:08x})");
            }
        }
        Ok(table)
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for SymbolTable {
    fn from_iter<T: IntoIterator<Item = (S, u32)>>(iter: T) -> Self {
        SymbolTable {
            symbols: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
