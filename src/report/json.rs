use crate::analysis::{AnalysisReport, Summary};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    annotate: bool,
}

impl JsonReporter {
    pub fn new(annotate: bool) -> Self {
        Self { annotate }
    }

    pub fn render(&self, report: &AnalysisReport) -> Result<String> {
        let json = JsonReport {
            version: env!("CARGO_PKG_VERSION"),
            total_candidates: report.candidates.len(),
            candidates: report
                .candidates
                .iter()
                .map(|c| JsonCandidate {
                    name: c.symbol.display_name(),
                    category: c.symbol.category.display_name(),
                    address: format!("0x{:x}", c.symbol.address),
                    owner: c.symbol.owner.clone(),
                    file: if self.annotate {
                        report.attribution(c).map(|p| p.display().to_string())
                    } else {
                        None
                    },
                    reason_kept: c.reason_kept.iter().map(|k| k.name()).collect(),
                })
                .collect(),
            summary: &report.summary,
        };
        serde_json::to_string_pretty(&json).into_diagnostic()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    total_candidates: usize,
    candidates: Vec<JsonCandidate>,
    summary: &'a Summary,
}

#[derive(Serialize)]
struct JsonCandidate {
    name: String,
    category: &'static str,
    address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    reason_kept: Vec<&'static str>,
}
