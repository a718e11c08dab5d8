use crate::analysis::{AnalysisReport, Candidate, Summary};
use crate::graph::SymbolCategory;
use std::fmt::Write;

/// Plain text: one candidate per line, then `# ` summary lines
pub struct TextReporter {
    annotate: bool,
}

impl TextReporter {
    pub fn new(annotate: bool) -> Self {
        Self { annotate }
    }

    pub fn render(&self, report: &AnalysisReport) -> String {
        let mut out = String::new();
        for candidate in &report.candidates {
            self.render_candidate(&mut out, report, candidate);
        }
        render_summary(&mut out, &report.summary);
        out
    }

    fn render_candidate(&self, out: &mut String, report: &AnalysisReport, candidate: &Candidate) {
        out.push_str(&candidate.symbol.display_name());
        if self.annotate {
            if let Some(path) = report.attribution(candidate) {
                let _ = write!(out, "\t{}", path.display());
            }
        }
        if !candidate.reason_kept.is_empty() {
            let stages: Vec<&str> = candidate.reason_kept.iter().map(|k| k.name()).collect();
            let _ = write!(out, "\t# report-only: {}", stages.join(", "));
        }
        out.push('\n');
    }
}

fn category_label(category: SymbolCategory) -> &'static str {
    match category {
        SymbolCategory::Class => "classes",
        SymbolCategory::Selector => "selectors",
    }
}

fn render_summary(out: &mut String, summary: &Summary) {
    let _ = writeln!(out, "# mode: {}", summary.mode);
    for c in &summary.categories {
        let _ = writeln!(
            out,
            "# {}: declared {}, referenced {}, filtered out {}, candidates {}",
            category_label(c.category),
            c.declared,
            c.referenced,
            c.filtered_out,
            c.candidates
        );
    }
    let _ = writeln!(
        out,
        "# total: declared {}, referenced {}, filtered out {}, candidates {}",
        summary.total_declared(),
        summary.total_referenced(),
        summary.total_filtered_out(),
        summary.total_candidates()
    );
    if summary.unresolved_references > 0 {
        let _ = writeln!(out, "# unresolved references: {}", summary.unresolved_references);
    }
    for name in &summary.oversized_symbols {
        let _ = writeln!(out, "# review: oversized symbol {}", name);
    }
}
