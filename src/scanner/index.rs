use crate::graph::{ReferenceGraph, Symbol};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A class declaration found in one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub superclass: Option<String>,
    /// Declared by `@implementation` rather than `@interface`
    pub implementation: bool,
}

/// Everything one worker extracted from one source file
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    pub path: PathBuf,
    pub declarations: Vec<ClassDecl>,
    /// Classes whose `@implementation` defines a load-time hook
    pub load_hooks: BTreeSet<String>,
    pub tokens: HashSet<String>,
    pub literals: HashSet<String>,
}

impl FileScan {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

/// String literals seen in source text or the binary's C-string section
#[derive(Debug, Clone, Default)]
pub struct StringLiteralIndex {
    literals: HashSet<String>,
}

impl StringLiteralIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, literal: impl Into<String>) {
        self.literals.insert(literal.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.literals.contains(name)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl<S: Into<String>> Extend<S> for StringLiteralIndex {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        self.literals.extend(iter.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for StringLiteralIndex {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut index = Self::new();
        index.extend(iter);
        index
    }
}

#[derive(Debug, Clone, Default)]
struct ClassInfo {
    declaring_files: BTreeSet<usize>,
    implementation_file: Option<usize>,
    superclass: Option<String>,
}

/// Merged result of a source scan: an inverted token index plus declarations
#[derive(Debug, Clone, Default)]
pub struct SourceIndex {
    files: Vec<PathBuf>,
    /// identifier → ids of the files it occurs in
    tokens: HashMap<String, BTreeSet<usize>>,
    classes: BTreeMap<String, ClassInfo>,
    load_hooks: BTreeSet<String>,
    literals: StringLiteralIndex,
}

impl SourceIndex {
    /// Merge per-file partial results. Input order does not matter.
    pub fn merge(mut scans: Vec<FileScan>) -> Self {
        scans.sort_by(|a, b| a.path.cmp(&b.path));

        let mut index = Self::default();
        for (id, scan) in scans.into_iter().enumerate() {
            for token in scan.tokens {
                index.tokens.entry(token).or_default().insert(id);
            }
            for decl in scan.declarations {
                let info = index.classes.entry(decl.name).or_default();
                info.declaring_files.insert(id);
                if decl.implementation && info.implementation_file.is_none() {
                    info.implementation_file = Some(id);
                }
                if info.superclass.is_none() {
                    info.superclass = decl.superclass;
                }
            }
            index.load_hooks.extend(scan.load_hooks);
            index.literals.extend(scan.literals);
            index.files.push(scan.path);
        }

        debug!(
            "Source index: {} files, {} distinct tokens, {} classes",
            index.files.len(),
            index.tokens.len(),
            index.classes.len()
        );
        index
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn literals(&self) -> &StringLiteralIndex {
        &self.literals
    }

    pub fn into_literals(self) -> StringLiteralIndex {
        self.literals
    }

    pub fn declared_classes(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Files other than the declaring ones that mention `name`
    pub fn referencing_files(&self, name: &str) -> Vec<&Path> {
        let declaring = self
            .classes
            .get(name)
            .map(|info| &info.declaring_files);
        self.tokens
            .get(name)
            .into_iter()
            .flatten()
            .filter(|id| declaring.map_or(true, |d| !d.contains(id)))
            .filter_map(|id| self.files.get(*id).map(PathBuf::as_path))
            .collect()
    }

    /// Text-mode reference graph: classes get ordinal addresses in name order
    pub fn build_graph(&self) -> ReferenceGraph {
        let mut graph = ReferenceGraph::new();

        for (ordinal, (name, info)) in self.classes.iter().enumerate() {
            let address = ordinal as u64 + 1;
            let file = info
                .implementation_file
                .or_else(|| info.declaring_files.iter().next().copied())
                .and_then(|id| self.files.get(id));

            let mut symbol = Symbol::class(address, name.clone());
            if let Some(file) = file {
                symbol = symbol.with_source_file(file.clone());
            }
            graph.classes.declare(symbol);

            if !self.referencing_files(name).is_empty() {
                graph.classes.reference(address);
            }
            if let Some(superclass) = &info.superclass {
                graph.hierarchy.add_edge(name.clone(), superclass.clone());
            }
        }

        graph.load_hooks = self.load_hooks.clone();
        graph
    }
}
