//! Error taxonomy for the analysis pipeline.
//!
//! Only conditions that stop a run are errors. Anomalies inside otherwise
//! readable inputs (unresolved pointers, malformed link-map lines) degrade to
//! smaller sets and are reported as warnings instead.

use miette::Diagnostic;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    /// The binary does not parse as a supported 64-bit Mach-O image
    #[error("{}: not a supported 64-bit Mach-O binary ({reason})", path.display())]
    #[diagnostic(
        code(objc_deadcode::format),
        help("pass a project path as well to fall back to source scanning")
    )]
    Format { path: PathBuf, reason: String },

    /// A universal binary has no slice for the requested architecture
    #[error("{}: no {wanted} slice in universal binary (available: {available})", path.display())]
    #[diagnostic(code(objc_deadcode::architecture))]
    ArchitectureNotFound {
        path: PathBuf,
        wanted: String,
        available: String,
    },

    /// Conflicting or invalid options, raised before any analysis work
    #[error("invalid configuration: {0}")]
    #[diagnostic(code(objc_deadcode::config))]
    Configuration(String),

    /// A required input path is missing or unreadable
    #[error("cannot read {}: {source}", path.display())]
    #[diagnostic(code(objc_deadcode::path))]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source scan did not finish before the configured deadline
    #[error("source scan exceeded the {0:?} timeout")]
    #[diagnostic(code(objc_deadcode::timeout))]
    Timeout(Duration),
}

impl Error {
    pub fn path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Path {
            path: path.into(),
            source,
        }
    }

    /// Binary-level failures that may be recovered from by scanning sources
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. } | Error::ArchitectureNotFound { .. })
    }
}
