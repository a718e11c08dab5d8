use crate::config::Config;
use crate::error::{Error, Result};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Type of Objective-C source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Header,
    Implementation,
    ObjcPlusPlus,
    Other,
}

impl FileType {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("h") => FileType::Header,
            Some("m") => FileType::Implementation,
            Some("mm") => FileType::ObjcPlusPlus,
            _ => FileType::Other,
        }
    }

    /// `.m` / `.mm` files hold `@implementation` blocks
    pub fn is_implementation(&self) -> bool {
        matches!(self, FileType::Implementation | FileType::ObjcPlusPlus)
    }
}

/// A discovered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl SourceFile {
    pub fn new(path: PathBuf) -> Self {
        let file_type = FileType::from_path(&path);
        Self { path, file_type }
    }

    /// Contents decoded lossily; legacy sources are not always UTF-8
    pub fn read_contents(&self) -> Result<String> {
        let bytes = std::fs::read(&self.path).map_err(|e| Error::path(&self.path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// File finder for discovering source files in a project
pub struct FileFinder<'a> {
    config: &'a Config,
}

impl<'a> FileFinder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// All source files under `root`, sorted by path
    pub fn find_files(&self, root: &Path) -> Result<Vec<SourceFile>> {
        let metadata = std::fs::metadata(root).map_err(|e| Error::path(root, e))?;
        if !metadata.is_dir() {
            return Err(Error::path(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        debug!("Scanning for files in: {}", root.display());

        let walker = WalkBuilder::new(root)
            .hidden(true)           // Skip hidden files
            .git_ignore(true)       // Respect .gitignore
            .git_global(true)       // Respect global gitignore
            .git_exclude(true)      // Respect .git/info/exclude
            .ignore(true)           // Respect .ignore files
            .parents(true)          // Check parent directories for ignore files
            .follow_links(false)    // Don't follow symlinks
            .build();

        let mut files: Vec<SourceFile> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let path = entry.path();

                if self.config.should_exclude(root, path) {
                    trace!("Excluding: {}", path.display());
                    return None;
                }
                if !self.config.is_source_extension(path) {
                    return None;
                }

                trace!("Found: {}", path.display());
                Some(SourceFile::new(path.to_path_buf()))
            })
            .collect();

        // Walk order is filesystem dependent
        files.sort_by(|a, b| a.path.cmp(&b.path));

        debug!("Found {} files", files.len());
        Ok(files)
    }
}
