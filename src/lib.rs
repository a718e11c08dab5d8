//! objc-deadcode - unused class and selector detection for Objective-C binaries
//!
//! Declared symbols are compared against referenced symbols using the
//! binary's own runtime metadata rather than text heuristics.
//!
//! # Architecture
//!
//! The analysis pipeline consists of:
//! 1. **Mach-O Reader** - Map the image and its Objective-C sections
//! 2. **Symbol Resolver** - Turn addresses into class and selector names
//! 3. **Link Map** - Attribute symbols to object files
//! 4. **Reference Graph** - Declared/referenced sets per category
//! 5. **Differ** - Declared minus referenced
//! 6. **Filter Pipeline** - Remove known false positives
//! 7. **Text Scanner** - Source fallback and the string-literal index
//! 8. **Reporting** - Text, terminal and JSON output

pub mod analysis;
pub mod config;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod linkmap;
pub mod macho;
pub mod report;
pub mod scanner;

pub use analysis::{AnalysisInputs, AnalysisReport, Analyzer, Candidate, FilterPipeline};
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{ReferenceGraph, ReferenceSet, Symbol, SymbolCategory};
pub use linkmap::LinkMap;
pub use macho::{BinaryImage, MachOReader, SymbolResolver};
pub use report::{ReportFormat, Reporter};
