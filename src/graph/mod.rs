//! Declared/referenced symbol sets and the class hierarchy they feed.

mod builder;
mod hierarchy;
mod symbol;

pub use builder::ReferenceGraphBuilder;
pub use hierarchy::ClassHierarchy;
pub use symbol::{demangle, ObjcName, Symbol, SymbolCategory};

use std::collections::{BTreeSet, HashMap, HashSet};

/// Declared and referenced addresses for one category.
///
/// `referenced` only ever holds addresses that are also declared; anything
/// else is rejected by [`ReferenceSet::reference`] so the caller can warn.
#[derive(Debug, Clone)]
pub struct ReferenceSet {
    category: SymbolCategory,
    symbols: HashMap<u64, Symbol>,
    pub declared: HashSet<u64>,
    pub referenced: HashSet<u64>,
}

impl ReferenceSet {
    pub fn new(category: SymbolCategory) -> Self {
        Self {
            category,
            symbols: HashMap::new(),
            declared: HashSet::new(),
            referenced: HashSet::new(),
        }
    }

    pub fn category(&self) -> SymbolCategory {
        self.category
    }

    /// Add a declared symbol. Returns false for duplicates or a wrong category.
    pub fn declare(&mut self, symbol: Symbol) -> bool {
        if symbol.category != self.category || self.declared.contains(&symbol.address) {
            return false;
        }
        self.declared.insert(symbol.address);
        self.symbols.insert(symbol.address, symbol);
        true
    }

    /// Mark a declared address as referenced
    pub fn reference(&mut self, address: u64) -> bool {
        if !self.declared.contains(&address) {
            return false;
        }
        self.referenced.insert(address);
        true
    }

    pub fn symbol(&self, address: u64) -> Option<&Symbol> {
        self.symbols.get(&address)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn is_referenced(&self, address: u64) -> bool {
        self.referenced.contains(&address)
    }

    /// Names of every referenced symbol
    pub fn referenced_names(&self) -> BTreeSet<&str> {
        self.referenced
            .iter()
            .filter_map(|addr| self.symbols.get(addr))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn declared_count(&self) -> usize {
        self.declared.len()
    }

    pub fn referenced_count(&self) -> usize {
        self.referenced.len()
    }
}

/// A pointer in a reference section that resolved to no known symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub section: &'static str,
    pub address: u64,
}

impl std::fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: 0x{:x}", self.section, self.address)
    }
}

/// Everything the differ and filter pipeline need from one input
#[derive(Debug, Clone)]
pub struct ReferenceGraph {
    pub classes: ReferenceSet,
    pub selectors: ReferenceSet,
    pub hierarchy: ClassHierarchy,

    /// Classes the runtime loader calls into without a static reference
    pub load_hooks: BTreeSet<String>,

    pub unresolved: Vec<UnresolvedReference>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self {
            classes: ReferenceSet::new(SymbolCategory::Class),
            selectors: ReferenceSet::new(SymbolCategory::Selector),
            hierarchy: ClassHierarchy::new(),
            load_hooks: BTreeSet::new(),
            unresolved: Vec::new(),
        }
    }

    pub fn set(&self, category: SymbolCategory) -> &ReferenceSet {
        match category {
            SymbolCategory::Class => &self.classes,
            SymbolCategory::Selector => &self.selectors,
        }
    }
}

impl Default for ReferenceGraph {
    fn default() -> Self {
        Self::new()
    }
}
