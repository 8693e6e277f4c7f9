//! Discovery - find candidate plugin modules below the search roots

use std::path::{Path, PathBuf};

use super::config::PluginHostConfig;
use super::error::PluginHostError;

/// Result of a discovery scan
#[derive(Debug, Default)]
pub struct Discovery {
    /// Candidate module paths, in scan order. Not de-duplicated.
    pub modules: Vec<PathBuf>,
    /// Roots or sub-directories that could not be scanned
    pub errors: Vec<PluginHostError>,
}

impl Discovery {
    /// Whether every root was scanned without error
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scan the configured roots for module files.
///
/// Each root is walked recursively. A root or directory that cannot be read
/// is recorded in [`Discovery::errors`] and the scan carries on with the
/// rest. Entries inside each directory are visited in name order.
pub fn discover(config: &PluginHostConfig) -> Discovery {
    let mut discovery = Discovery::default();

    for root in config.effective_roots() {
        tracing::debug!(root = %root.display(), "Scanning plugin root");
        let mut ancestors = Vec::new();
        scan_dir(&root, config, &mut ancestors, &mut discovery);
    }

    tracing::debug!(
        found = discovery.modules.len(),
        errors = discovery.errors.len(),
        "Discovery complete"
    );
    discovery
}

fn unavailable(discovery: &mut Discovery, path: &Path, source: std::io::Error) {
    tracing::warn!(dir = %path.display(), error = %source, "Plugin directory unavailable");
    discovery.errors.push(PluginHostError::DiscoveryRootUnavailable {
        path: path.to_path_buf(),
        source,
    });
}

/// `ancestors` holds the canonical paths of the directories being walked,
/// so a symlink back into one of them is detected instead of followed.
fn scan_dir(
    dir: &Path,
    config: &PluginHostConfig,
    ancestors: &mut Vec<PathBuf>,
    discovery: &mut Discovery,
) {
    let canonical = match std::fs::canonicalize(dir) {
        Ok(canonical) => canonical,
        Err(source) => return unavailable(discovery, dir, source),
    };
    if ancestors.contains(&canonical) {
        let source = std::io::Error::other(format!(
            "directory loop back to {}",
            canonical.display()
        ));
        return unavailable(discovery, dir, source);
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => return unavailable(discovery, dir, source),
    };

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(source) => unavailable(discovery, dir, source),
        }
    }
    paths.sort();

    ancestors.push(canonical);
    for path in paths {
        match std::fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => scan_dir(&path, config, ancestors, discovery),
            Ok(_) => {
                if config.matches_extension(&path) {
                    discovery.modules.push(path);
                }
            }
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Skipping dangling symlink");
            }
            Err(source) => unavailable(discovery, &path, source),
        }
    }
    ancestors.pop();
}

/// Plugin name for a module path: its file stem
pub fn plugin_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}
