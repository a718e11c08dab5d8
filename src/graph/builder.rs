use super::{ReferenceGraph, Symbol, SymbolCategory, UnresolvedReference};
use crate::macho::{BinaryImage, ObjcSection, SymbolResolver};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// `class_t.superclass`
const SUPERCLASS_OFFSET: u64 = 8;
/// `class_t.bits`
const CLASS_DATA_OFFSET: u64 = 32;
/// `class_ro_t.name`
const RO_NAME_OFFSET: u64 = 24;
const CLASS_DATA_MASK: u64 = !0x7;

/// Builds the binary-mode reference graph from Objective-C runtime sections
pub struct ReferenceGraphBuilder<'a> {
    image: &'a BinaryImage,
    resolver: &'a SymbolResolver,
    load_selectors: HashSet<String>,
    graph: ReferenceGraph,
}

impl<'a> ReferenceGraphBuilder<'a> {
    pub fn new(image: &'a BinaryImage, resolver: &'a SymbolResolver) -> Self {
        Self {
            image,
            resolver,
            load_selectors: HashSet::from(["load".to_string()]),
            graph: ReferenceGraph::new(),
        }
    }

    /// Class-method selectors that mark their class as a load hook
    pub fn with_load_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(mut self) -> ReferenceGraph {
        self.declare_classes();
        self.reference_classes();
        self.build_hierarchy();
        self.declare_selectors();
        self.reference_selectors();
        self.collect_load_hooks();

        info!(
            "Reference graph: {} classes ({} referenced), {} selectors ({} referenced), {} unresolved",
            self.graph.classes.declared_count(),
            self.graph.classes.referenced_count(),
            self.graph.selectors.declared_count(),
            self.graph.selectors.referenced_count(),
            self.graph.unresolved.len()
        );
        self.graph
    }

    fn unresolved(&mut self, kind: ObjcSection, address: u64) {
        warn!(
            "Unresolved reference in {}: 0x{:x}",
            kind.section_name(),
            address
        );
        self.graph.unresolved.push(UnresolvedReference {
            section: kind.section_name(),
            address,
        });
    }

    /// Name of the class whose `class_t` lives at `address`
    fn class_name_at(&self, address: u64) -> Option<String> {
        if let Some(symbol) = self.graph.classes.symbol(address) {
            return Some(symbol.name.clone());
        }
        match self.resolver.resolve(address) {
            Some(symbol) if symbol.category == SymbolCategory::Class => Some(symbol.name),
            _ => self.class_name_from_metadata(address),
        }
    }

    /// Read the name out of `class_ro_t` for classes with stripped symbols
    fn class_name_from_metadata(&self, address: u64) -> Option<String> {
        let data = self.image.read_pointer(address.checked_add(CLASS_DATA_OFFSET)?)? & CLASS_DATA_MASK;
        let name_ptr = self.image.read_pointer(data.checked_add(RO_NAME_OFFSET)?)?;
        let name = self.image.read_c_string(name_ptr)?;
        (!name.is_empty()).then_some(name)
    }

    fn declare_classes(&mut self) {
        for raw in self.image.pointers(ObjcSection::ClassList) {
            let Some(address) = self.image.decode_pointer(raw) else {
                continue;
            };
            match self.class_name_at(address) {
                Some(name) => {
                    self.graph.classes.declare(Symbol::class(address, name));
                }
                None => self.unresolved(ObjcSection::ClassList, address),
            }
        }
        debug!("Declared {} classes", self.graph.classes.declared_count());
    }

    fn reference_classes(&mut self) {
        for raw in self.image.pointers(ObjcSection::ClassRefs) {
            // Classes from other images are bound, not rebased
            let Some(address) = self.image.decode_pointer(raw) else {
                continue;
            };
            if self.graph.classes.reference(address) {
                continue;
            }
            let resolved = self
                .resolver
                .resolve(address)
                .filter(|s| s.category == SymbolCategory::Class)
                .map(|s| self.graph.classes.reference(s.address))
                .unwrap_or(false);
            if !resolved {
                self.unresolved(ObjcSection::ClassRefs, address);
            }
        }
    }

    fn build_hierarchy(&mut self) {
        let mut classes: Vec<(u64, String)> = self
            .graph
            .classes
            .symbols()
            .map(|s| (s.address, s.name.clone()))
            .collect();
        classes.sort();

        for (address, name) in classes {
            let Some(super_addr) = address
                .checked_add(SUPERCLASS_OFFSET)
                .and_then(|field| self.image.read_pointer(field))
            else {
                continue;
            };
            if let Some(superclass) = self.class_name_at(super_addr) {
                debug!("{} : {}", name, superclass);
                self.graph.hierarchy.add_edge(name, superclass);
            }
        }
    }

    fn declare_selectors(&mut self) {
        let selectors: Vec<Symbol> = self
            .resolver
            .objc_symbols()
            .filter(|s| s.category == SymbolCategory::Selector)
            .cloned()
            .collect();
        for symbol in selectors {
            self.graph.selectors.declare(symbol);
        }
    }

    fn reference_selectors(&mut self) {
        if !self.image.has_section(ObjcSection::SelectorRefs) {
            info!("No selector reference section; every selector is a raw candidate");
            return;
        }

        let mut names = HashSet::new();
        for raw in self.image.pointers(ObjcSection::SelectorRefs) {
            let name = self
                .image
                .decode_pointer(raw)
                .and_then(|address| self.image.read_c_string(address));
            match name {
                Some(name) => {
                    names.insert(name);
                }
                None => self.unresolved(ObjcSection::SelectorRefs, raw),
            }
        }

        let referenced: Vec<u64> = self
            .graph
            .selectors
            .symbols()
            .filter(|s| names.contains(&s.name))
            .map(|s| s.address)
            .collect();
        for address in referenced {
            self.graph.selectors.reference(address);
        }
        debug!(
            "{} selector names referenced, {} declared selectors matched",
            names.len(),
            self.graph.selectors.referenced_count()
        );
    }

    fn collect_load_hooks(&mut self) {
        for raw in self.image.pointers(ObjcSection::NonLazyClassList) {
            let Some(address) = self.image.decode_pointer(raw) else {
                continue;
            };
            if let Some(name) = self.class_name_at(address) {
                self.graph.load_hooks.insert(name);
            }
        }

        let owners: Vec<String> = self
            .graph
            .selectors
            .symbols()
            .filter(|s| s.class_method && self.load_selectors.contains(&s.name))
            .filter_map(|s| s.owner.clone())
            .collect();
        self.graph.load_hooks.extend(owners);
    }
}
