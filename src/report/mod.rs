mod json;
mod terminal;
mod text;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;
pub use text::TextReporter;

use crate::analysis::AnalysisReport;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Terminal,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "terminal" => Ok(ReportFormat::Terminal),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Writes the final candidate list
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
    annotate: bool,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self {
            format,
            output_path,
            annotate: true,
        }
    }

    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn report(&self, report: &AnalysisReport) -> Result<()> {
        let rendered = match &self.format {
            ReportFormat::Text => TextReporter::new(self.annotate).render(report),
            ReportFormat::Json => JsonReporter::new(self.annotate).render(report)?,
            ReportFormat::Terminal => {
                if self.output_path.is_none() {
                    TerminalReporter::new(self.annotate).report(report);
                    return Ok(());
                }
                // colours do not belong in files
                TextReporter::new(self.annotate).render(report)
            }
        };

        match &self.output_path {
            Some(path) => {
                std::fs::write(path, &rendered)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Failed to write report: {}", path.display()))?;
                tracing::info!("Report written to: {}", path.display());
            }
            None => print!("{}", rendered),
        }
        Ok(())
    }
}
