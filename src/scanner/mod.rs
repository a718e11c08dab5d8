//! Fallback text scanner.
//!
//! Used when no binary is available, and always used for the string-literal
//! index the dynamic-invocation filter consults. Any textual mention of a
//! class name outside its declaring files counts as a reference, comments
//! included, so text mode under-reports dead classes.

mod index;
mod progress;

pub use index::{ClassDecl, FileScan, SourceIndex, StringLiteralIndex};
pub use progress::{BarProgress, NoProgress, ProgressSink};

use crate::config::Config;
use crate::discovery::{FileFinder, SourceFile};
use crate::error::{Error, Result};
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

struct SourcePatterns {
    interface: Regex,
    implementation: Regex,
    end: Regex,
    load_hook: Regex,
    identifier: Regex,
    string_literal: Regex,
    include: Regex,
}

impl SourcePatterns {
    fn new(load_selectors: &[String]) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Configuration(format!("invalid scanner pattern: {}", e)))
        };

        let hooks = if load_selectors.is_empty() {
            "load".to_string()
        } else {
            load_selectors
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|")
        };

        Ok(Self {
            // group 2 is "(" for categories and extensions, group 3 the superclass
            interface: compile(r"@interface\s+([A-Za-z_]\w*)\s*(\(|:\s*([A-Za-z_]\w*))?")?,
            implementation: compile(r"@implementation\s+([A-Za-z_]\w*)\s*(\()?")?,
            end: compile(r"@end\b")?,
            load_hook: compile(&format!(r"\+\s*\(\s*void\s*\)\s*(?:{})\b", hooks))?,
            identifier: compile(r"[A-Za-z_][A-Za-z0-9_]*")?,
            string_literal: compile(r#""((?:[^"\\\n]|\\.)*)""#)?,
            include: compile(r"(?m)^[ \t]*#[ \t]*(?:import|include)\b.*$")?,
        })
    }

    fn scan(&self, file: &SourceFile, text: &str) -> FileScan {
        let mut scan = FileScan::new(file.path.clone());

        for caps in self.interface.captures_iter(text) {
            if caps.get(2).map(|m| m.as_str()) == Some("(") {
                continue;
            }
            scan.declarations.push(ClassDecl {
                name: caps[1].to_string(),
                superclass: caps.get(3).map(|m| m.as_str().to_string()),
                implementation: false,
            });
        }

        for caps in self.implementation.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = caps[1].to_string();

            let body_end = self
                .end
                .find_at(text, whole.end())
                .map(|m| m.start())
                .unwrap_or(text.len());
            if self.load_hook.is_match(&text[whole.end()..body_end]) {
                scan.load_hooks.insert(name.clone());
            }

            // `@implementation Foo (Extras)` adds to Foo, it does not declare it
            if caps.get(2).is_none() {
                scan.declarations.push(ClassDecl {
                    name,
                    superclass: None,
                    implementation: true,
                });
            }
        }

        // `#import "Foo.h"` is not a use of Foo
        let body = self.include.replace_all(text, "");

        scan.tokens = self
            .identifier
            .find_iter(&body)
            .map(|m| m.as_str().to_string())
            .collect();
        scan.literals = self
            .string_literal
            .captures_iter(&body)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        scan
    }
}

/// Walks a source tree and builds a [`SourceIndex`]
pub struct TextScanner<'a> {
    config: &'a Config,
    patterns: SourcePatterns,
    progress: &'a dyn ProgressSink,
    timeout: Option<Duration>,
}

impl<'a> TextScanner<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            patterns: SourcePatterns::new(&config.filters.load_selectors)?,
            progress: &NoProgress,
            timeout: config.scan.timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scan every source file under `root`
    pub fn scan(&self, root: &Path) -> Result<SourceIndex> {
        let files = FileFinder::new(self.config).find_files(root)?;
        info!("Scanning {} source files", files.len());
        self.scan_files(&files)
    }

    pub fn scan_files(&self, files: &[SourceFile]) -> Result<SourceIndex> {
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);
        let processed = AtomicUsize::new(0);
        let total = files.len();

        let scan_one = |file: &SourceFile| -> Result<Option<FileScan>> {
            if let (Some(deadline), Some(timeout)) = (deadline, self.timeout) {
                if Instant::now() >= deadline {
                    return Err(Error::Timeout(timeout));
                }
            }

            let result = match file.read_contents() {
                Ok(text) => Some(self.patterns.scan(file, &text)),
                Err(e) => {
                    warn!("Skipping {}: {}", file.path.display(), e);
                    None
                }
            };

            let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
            self.progress
                .progress(done, total, started.elapsed().as_millis() as u64);
            Ok(result)
        };

        let scans: Vec<Option<FileScan>> = if self.config.scan.parallel {
            files.par_iter().map(scan_one).collect::<Result<_>>()?
        } else {
            files.iter().map(scan_one).collect::<Result<_>>()?
        };
        self.progress.finish();

        let index = SourceIndex::merge(scans.into_iter().flatten().collect());
        debug!(
            "Scanned {} files in {}ms",
            index.files().len(),
            started.elapsed().as_millis()
        );
        Ok(index)
    }
}
