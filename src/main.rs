use clap::Parser;
use colored::Colorize;
use miette::Result;
use objc_deadcode::config::{Categories, Config};
use objc_deadcode::scanner::{BarProgress, NoProgress, ProgressSink};
use objc_deadcode::{AnalysisInputs, Analyzer, Error, ReportFormat, Reporter};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// objc-deadcode - Find unused Objective-C classes and selectors
#[derive(Parser, Debug)]
#[command(name = "objc-deadcode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project source root (enables the text fallback and the string-literal index)
    path: Option<PathBuf>,

    /// Mach-O binary to analyse
    #[arg(short, long, visible_alias = "macho-path")]
    binary: Option<PathBuf>,

    /// Linker map for source attribution
    #[arg(short, long, visible_alias = "linkmap-path")]
    link_map: Option<PathBuf>,

    /// Only report names starting with PREFIX (comma-separated or repeated)
    #[arg(short = 'w', long, visible_alias = "whitelist", value_delimiter = ',')]
    allow_prefix: Vec<String>,

    /// Never report names starting with PREFIX (comma-separated or repeated)
    #[arg(long, visible_alias = "ignore-prefix", value_delimiter = ',')]
    deny_prefix: Vec<String>,

    /// Categories to analyse: classes, selectors, both
    #[arg(long)]
    categories: Option<String>,

    /// Slice of a universal binary: arm64, arm64e, x86_64
    #[arg(long)]
    arch: Option<String>,

    /// Glob patterns to exclude from source scanning (can be specified multiple times)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Path prefixes to skip while scanning sources (space separated)
    #[arg(long, value_name = "PATHS")]
    ignore_paths: Option<String>,

    /// Output format [default: text, or `report.format` from the config file]
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Abort the source scan after SECS seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Scan source files on a single thread
    #[arg(long)]
    sequential: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Conflicting prefix lists are rejected before any file is read
    if !cli.allow_prefix.is_empty() && !cli.deny_prefix.is_empty() {
        return Err(Error::Configuration(
            "--allow-prefix and --deny-prefix are mutually exclusive".to_string(),
        )
        .into());
    }

    init_logging(cli.verbose, cli.quiet);

    info!("objc-deadcode v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    run_analysis(&config, &cli)
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if let Some(root) = &cli.path {
        Config::from_default_locations(root)?
    } else {
        Config::default()
    };

    // Override with CLI arguments
    if !cli.exclude.is_empty() {
        config.exclude.extend(cli.exclude.clone());
    }
    if let Some(paths) = &cli.ignore_paths {
        config
            .ignore_paths
            .extend(paths.split_whitespace().map(str::to_string));
    }
    if !cli.allow_prefix.is_empty() {
        if !config.filters.deny_prefixes.is_empty() {
            return Err(Error::Configuration(
                "--allow-prefix conflicts with deny_prefixes from the config file".to_string(),
            )
            .into());
        }
        config.filters.allow_prefixes = cli.allow_prefix.clone();
    }
    if !cli.deny_prefix.is_empty() {
        if !config.filters.allow_prefixes.is_empty() {
            return Err(Error::Configuration(
                "--deny-prefix conflicts with allow_prefixes from the config file".to_string(),
            )
            .into());
        }
        config.filters.deny_prefixes = cli.deny_prefix.clone();
    }
    if let Some(categories) = &cli.categories {
        config.categories = categories.parse::<Categories>()?;
    }
    if let Some(arch) = &cli.arch {
        config.binary.arch = Some(arch.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.scan.timeout_secs = Some(timeout);
    }
    if cli.sequential {
        config.scan.parallel = false;
    }

    config.validate()?;
    Ok(config)
}

fn run_analysis(config: &Config, cli: &Cli) -> Result<()> {
    let start_time = Instant::now();

    let inputs = AnalysisInputs {
        binary: cli.binary.clone(),
        link_map: cli.link_map.clone(),
        source_root: cli.path.clone(),
    };

    let bar;
    let progress: &dyn ProgressSink = if cli.quiet || inputs.source_root.is_none() {
        &NoProgress
    } else {
        bar = BarProgress::new();
        &bar
    };

    let report = Analyzer::new(config).with_progress(progress).run(&inputs)?;

    let format = match &cli.format {
        Some(format) => format.clone().into(),
        None => config
            .report
            .format
            .parse::<ReportFormat>()
            .map_err(Error::Configuration)?,
    };
    let reporter = Reporter::new(format, cli.output.clone())
        .with_annotations(config.report.annotate_sources);
    reporter.report(&report)?;

    if !cli.quiet {
        eprintln!(
            "{}",
            format!(
                "Analyzed {} in {:.2}s",
                describe_inputs(&inputs),
                start_time.elapsed().as_secs_f64()
            )
            .dimmed()
        );
    }

    Ok(())
}

fn describe_inputs(inputs: &AnalysisInputs) -> String {
    let name = |p: &Path| p.display().to_string();
    match (&inputs.binary, &inputs.source_root) {
        (Some(binary), Some(root)) => format!("{} with sources in {}", name(binary), name(root)),
        (Some(binary), None) => name(binary),
        (None, Some(root)) => name(root),
        (None, None) => "nothing".to_string(),
    }
}
