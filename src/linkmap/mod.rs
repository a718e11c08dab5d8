//! Linker map parsing for source attribution.
//!
//! A link map never gates the diff. A missing or unreadable map yields an
//! empty [`LinkMap`] and candidates simply go unattributed.

mod parser;

use parser::LinkMapParser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Symbol → contributing object file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMapEntry {
    /// Raw symbol name as the linker wrote it
    pub symbol_name: String,
    pub object_file: PathBuf,
}

/// One row of the `# Symbols:` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMapSymbol {
    pub address: u64,
    pub size: u64,
    pub name: String,
    pub file_index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    objects: HashMap<usize, PathBuf>,
    /// Keyed by demangled name
    entries: HashMap<String, LinkMapEntry>,
    symbols: Vec<LinkMapSymbol>,
    arch: Option<String>,
}

impl LinkMap {
    /// Read a link map from disk, degrading to an empty map on any failure
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Link map {} unreadable ({}); continuing without attribution", path.display(), e);
                return Self::default();
            }
        };

        // Object paths are not guaranteed to be UTF-8
        let content = String::from_utf8_lossy(&bytes);
        let map = Self::parse_content(&content);
        if map.is_empty() {
            warn!("Link map {} has no symbol entries", path.display());
        } else {
            info!("Loaded link map with {} attributed symbols", map.len());
        }
        map
    }

    pub fn parse_content(content: &str) -> Self {
        LinkMapParser::new().parse(content)
    }

    /// Object file for a demangled symbol name (`Foo`, `-[Foo bar]`)
    pub fn object_file_for(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(|e| e.object_file.as_path())
    }

    pub fn entry(&self, name: &str) -> Option<&LinkMapEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LinkMapEntry> {
        self.entries.values()
    }

    pub fn symbols(&self) -> &[LinkMapSymbol] {
        &self.symbols
    }

    pub fn arch(&self) -> Option<&str> {
        self.arch.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
