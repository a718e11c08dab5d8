use crate::error::Error;
use crate::graph::SymbolCategory;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Stage names accepted in `filters.report_only`
pub const STAGE_NAMES: [&str; 4] = [
    "ancestor-of-used",
    "lifecycle-hook",
    "dynamic-invocation",
    "prefix-rule",
];

/// Configuration for an objc-deadcode run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Glob patterns excluded from source scanning
    pub exclude: Vec<String>,

    /// Path prefixes excluded from source scanning
    pub ignore_paths: Vec<String>,

    /// Source file extensions the text scanner reads
    pub source_extensions: Vec<String>,

    /// Which categories to analyse
    pub categories: Categories,

    pub filters: FilterConfig,

    pub binary: BinaryConfig,

    pub scan: ScanConfig,

    pub report: ReportConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Categories {
    Classes,
    Selectors,
    Both,
}

impl Categories {
    pub fn selected(&self) -> Vec<SymbolCategory> {
        match self {
            Categories::Classes => vec![SymbolCategory::Class],
            Categories::Selectors => vec![SymbolCategory::Selector],
            Categories::Both => vec![SymbolCategory::Class, SymbolCategory::Selector],
        }
    }

    pub fn includes(&self, category: SymbolCategory) -> bool {
        self.selected().contains(&category)
    }
}

impl std::str::FromStr for Categories {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Error> {
        match s.trim().to_lowercase().as_str() {
            "classes" | "class" => Ok(Categories::Classes),
            "selectors" | "selector" | "methods" => Ok(Categories::Selectors),
            "both" | "all" => Ok(Categories::Both),
            other => Err(Error::Configuration(format!(
                "unknown category '{}' (expected classes, selectors or both)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Keep only candidates starting with one of these prefixes
    pub allow_prefixes: Vec<String>,

    /// Drop candidates starting with any of these prefixes
    pub deny_prefixes: Vec<String>,

    /// Stages that annotate candidates instead of removing them
    pub report_only: Vec<String>,

    /// Class methods the runtime loader calls (`+load`)
    pub load_selectors: Vec<String>,

    /// Selectors the runtime invokes without a message send in user code
    pub runtime_selectors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    /// Slice to analyse in a universal binary: arm64, arm64e, x86_64
    pub arch: Option<String>,

    /// Symbols spanning more bytes than this are flagged for review
    pub max_symbol_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Abort the source scan after this many seconds
    pub timeout_secs: Option<u64>,

    /// Scan files in parallel
    pub parallel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format: text, terminal, json
    pub format: String,

    /// Annotate candidates with their object or source file
    pub annotate_sources: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exclude: vec![
                "**/Pods/**".to_string(),
                "**/build/**".to_string(),
                "**/DerivedData/**".to_string(),
                "**/.git/**".to_string(),
            ],
            ignore_paths: vec![],
            source_extensions: vec!["h".to_string(), "m".to_string(), "mm".to_string()],
            categories: Categories::Both,
            filters: FilterConfig::default(),
            binary: BinaryConfig::default(),
            scan: ScanConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allow_prefixes: vec![],
            deny_prefixes: vec![],
            report_only: vec![],
            load_selectors: vec!["load".to_string()],
            runtime_selectors: vec![
                "initialize".to_string(),
                "dealloc".to_string(),
                ".cxx_construct".to_string(),
                ".cxx_destruct".to_string(),
            ],
        }
    }
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            arch: None,
            max_symbol_size: 1 << 20,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            parallel: true,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            annotate_sources: true,
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".objc-deadcode.yml",
            ".objc-deadcode.yaml",
            ".objc-deadcode.toml",
            "objc-deadcode.yml",
            "objc-deadcode.yaml",
            "objc-deadcode.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Reject option combinations no run can satisfy
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.filters.allow_prefixes.is_empty() && !self.filters.deny_prefixes.is_empty() {
            return Err(Error::Configuration(
                "allow prefixes and deny prefixes are mutually exclusive".to_string(),
            ));
        }
        for stage in &self.filters.report_only {
            if !STAGE_NAMES.contains(&stage.as_str()) {
                return Err(Error::Configuration(format!(
                    "unknown filter stage '{}' in report_only (expected one of: {})",
                    stage,
                    STAGE_NAMES.join(", ")
                )));
            }
        }
        if self.binary.max_symbol_size == 0 {
            return Err(Error::Configuration(
                "max_symbol_size must be greater than zero".to_string(),
            ));
        }
        if let Some(arch) = &self.binary.arch {
            arch.parse::<crate::macho::Arch>()?;
        }
        Ok(())
    }

    /// Check if a file under `root` matches an exclude glob or an ignored path prefix.
    ///
    /// Globs only see the part of the path below `root`, so a project that
    /// itself lives under `build/` or `Pods/` is still scanned. Ignored
    /// prefixes may be given relative to `root` or as absolute paths.
    pub fn should_exclude(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        let full_str = path.to_string_lossy().replace('\\', "/");
        self.exclude
            .iter()
            .any(|pattern| glob_match(pattern, &relative_str))
            || self.ignore_paths.iter().any(|prefix| {
                let prefix = prefix.trim_start_matches("./");
                relative_str.starts_with(prefix) || full_str.starts_with(prefix)
            })
    }

    pub fn is_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.source_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }
}

/// Simple glob matching for patterns like "KJ*" or "**/Pods/**"
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.starts_with('*') && !pattern.contains('/') {
        return text.ends_with(&pattern[1..]);
    }

    if pattern.ends_with('*') && !pattern.contains('/') {
        return text.starts_with(&pattern[..pattern.len() - 1]);
    }

    if pattern.contains("**") {
        // "**/Pods/**" matches a whole directory component anywhere
        if pattern.starts_with("**/") && pattern.ends_with("/**") {
            let dir_name = pattern.trim_start_matches("**/").trim_end_matches("/**");
            let dir_pattern = format!("/{}/", dir_name.trim_matches('/'));
            return text.contains(&dir_pattern) || text.starts_with(&dir_pattern[1..]);
        }

        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }
            if prefix.is_empty() {
                return text.ends_with(suffix) || text.contains(&format!("/{}", suffix));
            }
            if suffix.is_empty() {
                return text.starts_with(prefix) || text.contains(&format!("{}/", prefix));
            }
            return (text.starts_with(prefix) || text.contains(&format!("/{}/", prefix)))
                && (text.ends_with(suffix) || text.contains(&format!("/{}", suffix)));
        }
    }

    text == pattern
}
