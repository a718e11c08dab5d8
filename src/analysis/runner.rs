use super::{
    AnalysisMode, AnalysisReport, CategorySummary, Differ, FilterContext, FilterPipeline, Summary,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::graph::{ReferenceGraph, ReferenceGraphBuilder, SymbolCategory};
use crate::linkmap::LinkMap;
use crate::macho::{Arch, BinaryImage, MachOReader, ObjcSection, SymbolResolver};
use crate::scanner::{NoProgress, ProgressSink, SourceIndex, StringLiteralIndex, TextScanner};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Input paths for one run. At least one of `binary` and `source_root` is required.
#[derive(Debug, Clone, Default)]
pub struct AnalysisInputs {
    pub binary: Option<PathBuf>,
    pub link_map: Option<PathBuf>,
    pub source_root: Option<PathBuf>,
}

/// Runs reader → graph builder → differ → filter pipeline
pub struct Analyzer<'a> {
    config: &'a Config,
    progress: &'a dyn ProgressSink,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, inputs: &AnalysisInputs) -> Result<AnalysisReport> {
        // Configuration problems surface before any file is touched
        self.config.validate()?;
        let pipeline = FilterPipeline::from_config(self.config)?;
        let arch = self
            .config
            .binary
            .arch
            .as_deref()
            .map(str::parse::<Arch>)
            .transpose()?;
        if inputs.binary.is_none() && inputs.source_root.is_none() {
            return Err(Error::Configuration(
                "nothing to analyse: pass a binary, a project path, or both".to_string(),
            ));
        }

        if let Some(binary) = &inputs.binary {
            require_path(binary)?;
        }
        if let Some(root) = &inputs.source_root {
            require_path(root)?;
        }

        let link_map = inputs
            .link_map
            .as_deref()
            .map(LinkMap::load)
            .unwrap_or_default();

        let image = match &inputs.binary {
            Some(path) => match MachOReader::new().with_arch(arch).read(path) {
                Ok(image) => Some(image),
                Err(e) if e.is_format() && inputs.source_root.is_some() => {
                    warn!("{}; falling back to source scanning", e);
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let source_index = match &inputs.source_root {
            Some(root) => Some(
                TextScanner::new(self.config)?
                    .with_progress(self.progress)
                    .scan(root)?,
            ),
            None => None,
        };

        let (mode, graph, oversized_symbols, binary_strings) = match &image {
            Some(image) => {
                if let (Some(map_arch), arch) = (link_map.arch(), image.arch_name()) {
                    if map_arch != arch {
                        warn!("Link map is for {} but the binary slice is {}", map_arch, arch);
                    }
                }
                let (graph, oversized) = self.binary_graph(image, &link_map);
                let strings = image.c_strings(ObjcSection::CStrings);
                (AnalysisMode::Binary, graph, oversized, strings)
            }
            None => {
                let index = source_index.as_ref().ok_or_else(|| {
                    Error::Configuration("no binary and no source tree to analyse".to_string())
                })?;
                (AnalysisMode::Text, index.build_graph(), Vec::new(), Vec::new())
            }
        };

        let mut literals = source_index
            .map(SourceIndex::into_literals)
            .unwrap_or_default();
        literals.extend(binary_strings);
        info!("String literal index: {} entries", literals.len());

        self.diff_and_filter(mode, &graph, &literals, &pipeline, oversized_symbols, link_map)
    }

    fn binary_graph(&self, image: &BinaryImage, link_map: &LinkMap) -> (ReferenceGraph, Vec<String>) {
        let max = self.config.binary.max_symbol_size;
        let resolver = if link_map.symbols().is_empty() {
            SymbolResolver::from_image(image, max)
        } else {
            SymbolResolver::with_link_map(image, link_map, max)
        };

        let graph = ReferenceGraphBuilder::new(image, &resolver)
            .with_load_selectors(self.config.filters.load_selectors.iter().cloned())
            .build();

        let oversized = resolver
            .oversized_symbols()
            .into_iter()
            .map(str::to_string)
            .collect();
        (graph, oversized)
    }

    fn diff_and_filter(
        &self,
        mode: AnalysisMode,
        graph: &ReferenceGraph,
        literals: &StringLiteralIndex,
        pipeline: &FilterPipeline,
        oversized_symbols: Vec<String>,
        link_map: LinkMap,
    ) -> Result<AnalysisReport> {
        let ctx = FilterContext::from_config(graph, literals, self.config)?;

        let mut candidates = Vec::new();
        let mut categories = Vec::new();
        for category in self.config.categories.selected() {
            if mode == AnalysisMode::Text && category == SymbolCategory::Selector {
                warn!("Selector analysis needs a binary; text mode reports classes only");
                continue;
            }

            let set = graph.set(category);
            let raw = Differ::diff(set);
            let raw_count = raw.len();
            let kept = pipeline.run(raw, &ctx);

            info!(
                "{}: {} declared, {} referenced, {} raw candidates, {} after filtering",
                category,
                set.declared_count(),
                set.referenced_count(),
                raw_count,
                kept.len()
            );
            categories.push(CategorySummary {
                category,
                declared: set.declared_count(),
                referenced: set.referenced_count(),
                raw_candidates: raw_count,
                filtered_out: raw_count - kept.len(),
                candidates: kept.len(),
            });
            candidates.extend(kept);
        }

        Ok(AnalysisReport {
            candidates,
            summary: Summary {
                mode,
                categories,
                unresolved_references: graph.unresolved.len(),
                oversized_symbols,
            },
            link_map,
        })
    }
}

fn require_path(path: &Path) -> Result<()> {
    std::fs::metadata(path)
        .map(|_| ())
        .map_err(|e| Error::path(path, e))
}
