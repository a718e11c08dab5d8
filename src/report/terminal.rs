use crate::analysis::{AnalysisMode, AnalysisReport, Candidate};
use crate::graph::SymbolCategory;
use colored::Colorize;

/// Terminal reporter with colored output, grouped by category
pub struct TerminalReporter {
    annotate: bool,
}

impl TerminalReporter {
    pub fn new(annotate: bool) -> Self {
        Self { annotate }
    }

    pub fn report(&self, report: &AnalysisReport) {
        if report.candidates.is_empty() {
            println!("{}", "No unused classes or selectors found!".green().bold());
            self.print_summary(report);
            return;
        }

        println!();
        println!(
            "{}",
            format!("Found {} unused candidates:", report.candidates.len())
                .yellow()
                .bold()
        );
        println!();

        for category in [SymbolCategory::Class, SymbolCategory::Selector] {
            let items: Vec<&Candidate> = report
                .candidates
                .iter()
                .filter(|c| c.category() == category)
                .collect();
            if items.is_empty() {
                continue;
            }

            let header = match category {
                SymbolCategory::Class => "Classes",
                SymbolCategory::Selector => "Selectors",
            };
            println!("{}", format!("{} ({})", header, items.len()).cyan().bold());
            for item in items {
                self.print_item(report, item);
            }
            println!();
        }

        self.print_summary(report);
        self.print_tips(report);
    }

    fn print_item(&self, report: &AnalysisReport, item: &Candidate) {
        let mut line = format!("  {} {}", "•".yellow(), item.symbol.display_name().white());
        if self.annotate {
            if let Some(path) = report.attribution(item) {
                line.push_str(&format!(" {}", path.display().to_string().dimmed()));
            }
        }
        if !item.reason_kept.is_empty() {
            let stages: Vec<&str> = item.reason_kept.iter().map(|k| k.name()).collect();
            line.push_str(&format!(" [{}]", stages.join(", ")).blue().to_string());
        }
        println!("{}", line);
    }

    fn print_summary(&self, report: &AnalysisReport) {
        let summary = &report.summary;
        println!("{}", "─".repeat(60).dimmed());
        println!("Mode: {}", summary.mode.to_string().bold());
        for c in &summary.categories {
            println!(
                "  {:<10} declared {}, referenced {}, filtered out {}, {}",
                c.category.display_name(),
                c.declared,
                c.referenced,
                c.filtered_out,
                format!("{} candidates", c.candidates).yellow()
            );
        }
        if summary.unresolved_references > 0 {
            println!(
                "{}",
                format!("{} unresolved references ignored", summary.unresolved_references).dimmed()
            );
        }
        for name in &summary.oversized_symbols {
            println!("{} {} spans an unusually large range", "review:".red(), name);
        }
    }

    fn print_tips(&self, report: &AnalysisReport) {
        println!();
        println!("{}", "Review before deleting:".dimmed());
        println!(
            "  {}",
            "Classes created with NSClassFromString or selectors sent with performSelector from computed strings are not detected."
                .dimmed()
        );
        println!(
            "  {}",
            "Methods added in categories may still be called from other frameworks.".dimmed()
        );
        if report.summary.mode == AnalysisMode::Text {
            println!(
                "  {}",
                "Text mode counts any mention of a class name, including comments, as a use.".dimmed()
            );
        }
    }
}
