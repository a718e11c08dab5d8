//! Ordered false-positive filters applied to raw candidates.
//!
//! Stages are pure predicates over a [`FilterContext`] built once per run, so
//! running the pipeline again over its own output changes nothing.

use super::{Candidate, FilterStageKind};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{ReferenceGraph, SymbolCategory};
use crate::scanner::StringLiteralIndex;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Mutually exclusive allow/deny name-prefix list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PrefixRule {
    #[default]
    None,
    Allow(Vec<String>),
    Deny(Vec<String>),
}

impl PrefixRule {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self> {
        let clean = |list: &[String]| -> Vec<String> {
            list.iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        };
        let allow = clean(allow);
        let deny = clean(deny);

        match (allow.is_empty(), deny.is_empty()) {
            (false, false) => Err(Error::Configuration(
                "allow prefixes and deny prefixes are mutually exclusive".to_string(),
            )),
            (false, true) => Ok(PrefixRule::Allow(allow)),
            (true, false) => Ok(PrefixRule::Deny(deny)),
            (true, true) => Ok(PrefixRule::None),
        }
    }

    /// Whether a name is excluded from the report
    pub fn excludes(&self, name: &str) -> bool {
        match self {
            PrefixRule::None => false,
            PrefixRule::Allow(prefixes) => !prefixes.iter().any(|p| name.starts_with(p.as_str())),
            PrefixRule::Deny(prefixes) => prefixes.iter().any(|p| name.starts_with(p.as_str())),
        }
    }
}

/// Read-only facts every stage consults
pub struct FilterContext<'a> {
    graph: &'a ReferenceGraph,
    /// Transitive superclasses of every class known to be alive
    used_ancestors: HashSet<String>,
    hook_selectors: HashSet<String>,
    literals: &'a StringLiteralIndex,
    prefixes: PrefixRule,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        graph: &'a ReferenceGraph,
        literals: &'a StringLiteralIndex,
        hook_selectors: impl IntoIterator<Item = String>,
        prefixes: PrefixRule,
    ) -> Self {
        // Referenced classes, plus classes kept alive by the loader or by name lookup
        let mut alive: BTreeSet<&str> = graph.classes.referenced_names();
        alive.extend(graph.load_hooks.iter().map(String::as_str));
        alive.extend(
            graph
                .classes
                .symbols()
                .filter(|s| literals.contains(&s.name))
                .map(|s| s.name.as_str()),
        );
        let used_ancestors = graph.hierarchy.ancestors_of_all(alive);
        debug!("{} classes are ancestors of used classes", used_ancestors.len());

        Self {
            graph,
            used_ancestors,
            hook_selectors: hook_selectors.into_iter().collect(),
            literals,
            prefixes,
        }
    }

    pub fn from_config(
        graph: &'a ReferenceGraph,
        literals: &'a StringLiteralIndex,
        config: &Config,
    ) -> Result<Self> {
        let prefixes = PrefixRule::new(
            &config.filters.allow_prefixes,
            &config.filters.deny_prefixes,
        )?;
        let hooks = config
            .filters
            .load_selectors
            .iter()
            .chain(&config.filters.runtime_selectors)
            .cloned();
        Ok(Self::new(graph, literals, hooks, prefixes))
    }

    pub fn is_used_ancestor(&self, class: &str) -> bool {
        self.used_ancestors.contains(class)
    }

    pub fn is_load_hook(&self, class: &str) -> bool {
        self.graph.load_hooks.contains(class)
    }

    pub fn is_hook_selector(&self, selector: &str) -> bool {
        self.hook_selectors.contains(selector)
    }

    pub fn has_literal(&self, name: &str) -> bool {
        self.literals.contains(name)
    }

    pub fn prefixes(&self) -> &PrefixRule {
        &self.prefixes
    }
}

/// One pipeline stage
pub trait FilterStage: Send + Sync {
    fn kind(&self) -> FilterStageKind;

    /// Whether the candidate is a known false positive for this stage
    fn should_remove(&self, candidate: &Candidate, ctx: &FilterContext) -> bool;

    /// Drop matching candidates, or only annotate them when `report_only`
    fn apply(
        &self,
        candidates: Vec<Candidate>,
        ctx: &FilterContext,
        report_only: bool,
    ) -> Vec<Candidate> {
        let kind = self.kind();
        candidates
            .into_iter()
            .filter_map(|mut candidate| {
                if !self.should_remove(&candidate, ctx) {
                    return Some(candidate);
                }
                if report_only {
                    if !candidate.reason_kept.contains(&kind) {
                        candidate.reason_kept.push(kind);
                    }
                    return Some(candidate);
                }
                debug!("{} removed {}", kind, candidate.symbol.display_name());
                None
            })
            .collect()
    }
}

/// Superclasses of used classes are alive even without a direct reference
pub struct AncestorOfUsedFilter;

impl FilterStage for AncestorOfUsedFilter {
    fn kind(&self) -> FilterStageKind {
        FilterStageKind::AncestorOfUsed
    }

    fn should_remove(&self, candidate: &Candidate, ctx: &FilterContext) -> bool {
        candidate.category() == SymbolCategory::Class && ctx.is_used_ancestor(&candidate.symbol.name)
    }
}

/// Classes and selectors the runtime calls on its own
pub struct LifecycleHookFilter;

impl FilterStage for LifecycleHookFilter {
    fn kind(&self) -> FilterStageKind {
        FilterStageKind::LifecycleHook
    }

    fn should_remove(&self, candidate: &Candidate, ctx: &FilterContext) -> bool {
        match candidate.category() {
            SymbolCategory::Class => ctx.is_load_hook(&candidate.symbol.name),
            SymbolCategory::Selector => ctx.is_hook_selector(&candidate.symbol.name),
        }
    }
}

/// Names that appear as string literals may be looked up at runtime
pub struct DynamicInvocationFilter;

impl FilterStage for DynamicInvocationFilter {
    fn kind(&self) -> FilterStageKind {
        FilterStageKind::DynamicInvocation
    }

    fn should_remove(&self, candidate: &Candidate, ctx: &FilterContext) -> bool {
        ctx.has_literal(&candidate.symbol.name)
    }
}

/// Allow/deny prefix list over class names (owning class for selectors)
pub struct PrefixFilter;

impl FilterStage for PrefixFilter {
    fn kind(&self) -> FilterStageKind {
        FilterStageKind::PrefixRule
    }

    fn should_remove(&self, candidate: &Candidate, ctx: &FilterContext) -> bool {
        ctx.prefixes().excludes(candidate.class_name())
    }
}

/// The ordered stage list
pub struct FilterPipeline {
    stages: Vec<Box<dyn FilterStage>>,
    report_only: HashSet<FilterStageKind>,
}

impl FilterPipeline {
    /// Ancestor, lifecycle, dynamic invocation, then prefix rules
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(AncestorOfUsedFilter),
                Box::new(LifecycleHookFilter),
                Box::new(DynamicInvocationFilter),
                Box::new(PrefixFilter),
            ],
            report_only: HashSet::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut pipeline = Self::standard();
        for name in &config.filters.report_only {
            let kind = FilterStageKind::from_name(name).ok_or_else(|| {
                Error::Configuration(format!("unknown filter stage '{}'", name))
            })?;
            pipeline.report_only.insert(kind);
        }
        Ok(pipeline)
    }

    pub fn with_report_only(mut self, kind: FilterStageKind) -> Self {
        self.report_only.insert(kind);
        self
    }

    pub fn stages(&self) -> impl Iterator<Item = FilterStageKind> + '_ {
        self.stages.iter().map(|s| s.kind())
    }

    pub fn run(&self, candidates: Vec<Candidate>, ctx: &FilterContext) -> Vec<Candidate> {
        self.stages.iter().fold(candidates, |remaining, stage| {
            let report_only = self.report_only.contains(&stage.kind());
            stage.apply(remaining, ctx, report_only)
        })
    }
}
