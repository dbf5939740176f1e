use crate::models::LogFile;
use crate::session_utils::SessionUtils;
use anyhow::{Context, Result};
use glob::glob;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Supplies the log files a report or monitor tick should look at.
///
/// The monitor asks again on every tick, so implementations should reflect
/// files created since the previous call.
pub trait FileSource: Send + Sync {
    fn discover(&self) -> Result<Vec<LogFile>>;
}

/// Finds `projects/**/*.jsonl` under each configured Claude data root.
#[derive(Debug, Clone)]
pub struct ClaudeProjectsDiscovery {
    roots: Vec<PathBuf>,
}

impl ClaudeProjectsDiscovery {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Roots that actually contain a `projects` directory.
    pub fn existing_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|root| root.join("projects").is_dir())
            .cloned()
            .collect()
    }
}

impl FileSource for ClaudeProjectsDiscovery {
    fn discover(&self) -> Result<Vec<LogFile>> {
        // A root may be listed twice or nest inside another
        let mut found = BTreeSet::new();

        for root in self.existing_roots() {
            let pattern = root.join("projects").join("**").join("*.jsonl");
            let pattern = pattern.to_string_lossy();
            let entries = glob(&pattern)
                .with_context(|| format!("Invalid glob pattern: {}", pattern))?;

            for entry in entries.flatten() {
                if entry.is_file() {
                    found.insert(entry);
                }
            }
        }

        debug!(roots = self.roots.len(), files = found.len(), "Discovered log files");
        Ok(found.into_iter().map(SessionUtils::log_file).collect())
    }
}

/// A fixed list of files, for callers that do their own discovery.
#[derive(Debug, Clone, Default)]
pub struct StaticFileList {
    files: Vec<LogFile>,
}

impl StaticFileList {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            files: paths.into_iter().map(SessionUtils::log_file).collect(),
        }
    }
}

impl FileSource for StaticFileList {
    fn discover(&self) -> Result<Vec<LogFile>> {
        Ok(self.files.clone())
    }
}
