mod differ;
mod filters;
mod runner;

pub use differ::Differ;
pub use filters::{
    AncestorOfUsedFilter, DynamicInvocationFilter, FilterContext, FilterPipeline, FilterStage,
    LifecycleHookFilter, PrefixFilter, PrefixRule,
};
pub use runner::{AnalysisInputs, Analyzer};

use crate::graph::{Symbol, SymbolCategory};
use crate::linkmap::LinkMap;
use serde::Serialize;
use std::path::Path;

/// The canonical filter stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterStageKind {
    AncestorOfUsed,
    LifecycleHook,
    DynamicInvocation,
    PrefixRule,
}

impl FilterStageKind {
    pub const ALL: [FilterStageKind; 4] = [
        FilterStageKind::AncestorOfUsed,
        FilterStageKind::LifecycleHook,
        FilterStageKind::DynamicInvocation,
        FilterStageKind::PrefixRule,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterStageKind::AncestorOfUsed => "ancestor-of-used",
            FilterStageKind::LifecycleHook => "lifecycle-hook",
            FilterStageKind::DynamicInvocation => "dynamic-invocation",
            FilterStageKind::PrefixRule => "prefix-rule",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl std::fmt::Display for FilterStageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A suspected dead symbol.
///
/// `reason_kept` lists the report-only stages that would have removed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub reason_kept: Vec<FilterStageKind>,
}

impl Candidate {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            reason_kept: Vec::new(),
        }
    }

    pub fn category(&self) -> SymbolCategory {
        self.symbol.category
    }

    /// Name used for prefix rules: the class, or the owning class of a selector
    pub fn class_name(&self) -> &str {
        match self.symbol.category {
            SymbolCategory::Class => &self.symbol.name,
            SymbolCategory::Selector => self.symbol.owner.as_deref().unwrap_or(&self.symbol.name),
        }
    }
}

/// Where the declared/referenced sets came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Binary,
    Text,
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMode::Binary => write!(f, "binary"),
            AnalysisMode::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub category: SymbolCategory,
    pub declared: usize,
    pub referenced: usize,
    pub raw_candidates: usize,
    pub filtered_out: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub mode: AnalysisMode,
    pub categories: Vec<CategorySummary>,
    pub unresolved_references: usize,
    pub oversized_symbols: Vec<String>,
}

impl Summary {
    pub fn total_declared(&self) -> usize {
        self.categories.iter().map(|c| c.declared).sum()
    }

    pub fn total_referenced(&self) -> usize {
        self.categories.iter().map(|c| c.referenced).sum()
    }

    pub fn total_filtered_out(&self) -> usize {
        self.categories.iter().map(|c| c.filtered_out).sum()
    }

    pub fn total_candidates(&self) -> usize {
        self.categories.iter().map(|c| c.candidates).sum()
    }
}

/// Final output of one run, handed to the reporter
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Sorted by category, then address
    pub candidates: Vec<Candidate>,
    pub summary: Summary,
    pub link_map: LinkMap,
}

impl AnalysisReport {
    /// Object file from the link map, else the declaring source file
    pub fn attribution<'a>(&'a self, candidate: &'a Candidate) -> Option<&'a Path> {
        self.link_map
            .object_file_for(&candidate.symbol.display_name())
            .or(candidate.symbol.source_file.as_deref())
    }
}
