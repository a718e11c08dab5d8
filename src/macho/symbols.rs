use super::reader::BinaryImage;
use crate::graph::{demangle, ObjcName, Symbol};
use crate::linkmap::LinkMap;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct RangeEntry {
    address: u64,
    end: u64,
    raw_name: String,
    symbol: Option<Symbol>,
    oversized: bool,
}

impl RangeEntry {
    fn covers(&self, address: u64) -> bool {
        if self.oversized {
            address == self.address
        } else {
            address >= self.address && address < self.end
        }
    }
}

struct Candidate {
    address: u64,
    raw_name: String,
    size: Option<u64>,
    section_end: Option<u64>,
}

/// Address → symbol lookup over a sorted range table.
///
/// A symbol's range ends at its explicit size when one is known (link map),
/// otherwise at the next symbol's address, capped at the end of its section.
/// Ranges wider than the sanity threshold are kept for exact-address lookups
/// only and are listed by [`SymbolResolver::oversized_symbols`].
#[derive(Debug, Clone, Default)]
pub struct SymbolResolver {
    entries: Vec<RangeEntry>,
    by_name: HashMap<String, u64>,
}

impl SymbolResolver {
    pub fn from_image(image: &BinaryImage, max_symbol_size: u64) -> Self {
        Self::build(Self::image_candidates(image), max_symbol_size)
    }

    /// Image symbols augmented with link-map symbols; link-map sizes win
    pub fn with_link_map(image: &BinaryImage, link_map: &LinkMap, max_symbol_size: u64) -> Self {
        let mut candidates = Self::image_candidates(image);
        for sym in link_map.symbols() {
            let section_end = image
                .sections()
                .iter()
                .find(|s| s.contains(sym.address))
                .map(|s| s.end());
            candidates.push(Candidate {
                address: sym.address,
                raw_name: sym.name.clone(),
                size: (sym.size > 0).then_some(sym.size),
                section_end,
            });
        }
        Self::build(candidates, max_symbol_size)
    }

    fn image_candidates(image: &BinaryImage) -> Vec<Candidate> {
        let sections = image.sections();
        image
            .symbols()
            .iter()
            .map(|sym| Candidate {
                address: sym.address,
                raw_name: sym.name.clone(),
                size: None,
                section_end: sym
                    .section
                    .checked_sub(1)
                    .and_then(|idx| sections.get(idx))
                    .map(|s| s.end()),
            })
            .collect()
    }

    fn build(mut candidates: Vec<Candidate>, max_symbol_size: u64) -> Self {
        candidates.sort_by(|a, b| {
            a.address
                .cmp(&b.address)
                .then_with(|| a.raw_name.cmp(&b.raw_name))
        });

        // One entry per address: Objective-C names beat plain aliases
        let mut merged: Vec<Candidate> = Vec::with_capacity(candidates.len());
        let mut by_name = HashMap::new();
        for candidate in candidates {
            by_name
                .entry(candidate.raw_name.clone())
                .or_insert(candidate.address);
            by_name
                .entry(demangle(&candidate.raw_name))
                .or_insert(candidate.address);

            match merged.last_mut() {
                Some(last) if last.address == candidate.address => {
                    let is_objc = ObjcName::parse(&candidate.raw_name).is_some();
                    if is_objc && ObjcName::parse(&last.raw_name).is_none() {
                        last.raw_name = candidate.raw_name;
                    }
                    last.size = last.size.or(candidate.size);
                    last.section_end = last.section_end.or(candidate.section_end);
                }
                _ => merged.push(candidate),
            }
        }

        let mut entries = Vec::with_capacity(merged.len());
        for (idx, candidate) in merged.iter().enumerate() {
            let next = merged.get(idx + 1).map(|n| n.address);
            let end = match (candidate.size, next, candidate.section_end) {
                (Some(size), _, _) => candidate.address.saturating_add(size),
                (None, Some(next), Some(section_end)) => next.min(section_end),
                (None, Some(next), None) => next,
                (None, None, Some(section_end)) => section_end,
                (None, None, None) => candidate.address.saturating_add(1),
            };
            let end = end.max(candidate.address.saturating_add(1));
            let span = end.saturating_sub(candidate.address);
            let oversized = span > max_symbol_size;
            let symbol = Symbol::from_raw_name(candidate.address, &candidate.raw_name);

            if oversized && symbol.is_some() {
                warn!(
                    "Symbol {} spans 0x{:x} bytes; only exact-address references will resolve",
                    candidate.raw_name, span
                );
            }

            entries.push(RangeEntry {
                address: candidate.address,
                end,
                raw_name: candidate.raw_name.clone(),
                symbol,
                oversized,
            });
        }

        debug!("Symbol resolver: {} ranges", entries.len());
        Self { entries, by_name }
    }

    /// The Objective-C symbol whose range encloses `address`
    pub fn resolve(&self, address: u64) -> Option<Symbol> {
        let idx = self.entries.partition_point(|e| e.address <= address);
        let entry = self.entries.get(idx.checked_sub(1)?)?;
        if entry.covers(address) {
            entry.symbol.clone()
        } else {
            None
        }
    }

    /// Address for a raw (`_OBJC_CLASS_$_Foo`) or demangled (`Foo`) name
    pub fn resolve_by_name(&self, name: &str) -> Option<u64> {
        self.by_name.get(name).copied()
    }

    /// Every class and selector symbol, in address order
    pub fn objc_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.entries.iter().filter_map(|e| e.symbol.as_ref())
    }

    /// Names of symbols whose range exceeded the sanity threshold
    pub fn oversized_symbols(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.oversized)
            .map(|e| e.raw_name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
