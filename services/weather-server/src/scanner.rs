//! Directory scanning for new grid files and observation feeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{ProductConfig, ServerConfig};

/// A file to decode and publish.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeJob {
    Grid { path: PathBuf, product: ProductConfig },
    Observations { path: PathBuf },
}

impl DecodeJob {
    pub fn path(&self) -> &Path {
        match self {
            Self::Grid { path, .. } | Self::Observations { path } => path,
        }
    }
}

/// Remembers the modification time of every file it has handed out, so each
/// version of a file is decoded once.
pub struct Scanner {
    grid_dir: PathBuf,
    observation_dir: PathBuf,
    products: Vec<ProductConfig>,
    seen: HashMap<PathBuf, SystemTime>,
}

impl Scanner {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            grid_dir: config.grid_dir.clone(),
            observation_dir: config.observation_dir.clone(),
            products: config.products.clone(),
            seen: HashMap::new(),
        }
    }

    /// Jobs for files that are new or changed since the last scan. Grid
    /// files come first, ordered by name, so forecast hours of one cycle
    /// arrive in order.
    pub fn scan(&mut self) -> Vec<DecodeJob> {
        let mut jobs = Vec::new();
        let grid_dir = self.grid_dir.clone();
        let observation_dir = self.observation_dir.clone();

        for path in self.changed_files(&grid_dir) {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match self.products.iter().find(|p| p.matches(name)) {
                Some(product) => jobs.push(DecodeJob::Grid {
                    path: path.clone(),
                    product: product.clone(),
                }),
                None => debug!(path = %path.display(), "Ignoring file with no matching product"),
            }
        }

        for path in self.changed_files(&observation_dir) {
            jobs.push(DecodeJob::Observations { path });
        }

        jobs
    }

    /// Forget a file so the next scan offers it again.
    pub fn forget(&mut self, path: &Path) {
        self.seen.remove(path);
    }

    fn changed_files(&mut self, dir: &Path) -> Vec<PathBuf> {
        if !dir.exists() {
            return Vec::new();
        }

        let mut changed = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_hidden(entry.path()) {
                continue;
            }

            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(modified)) => modified,
                _ => continue,
            };
            let path = entry.into_path();
            if self.seen.get(&path) == Some(&modified) {
                continue;
            }
            self.seen.insert(path.clone(), modified);
            changed.push(path);
        }
        changed
    }
}

// Partially written downloads are kept under a dot-prefixed name.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_for(root: &Path) -> ServerConfig {
        ServerConfig {
            grid_dir: root.join("grib"),
            observation_dir: root.join("metar"),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn test_scan_classifies_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        fs::create_dir_all(&config.grid_dir).unwrap();
        fs::create_dir_all(&config.observation_dir).unwrap();
        fs::write(config.grid_dir.join("gfs.t06z.pgrb2.0p25.f003"), b"x").unwrap();
        fs::write(config.grid_dir.join("WAFS_blended_2024031206f06.grib2"), b"x").unwrap();
        fs::write(config.grid_dir.join("notes.txt"), b"x").unwrap();
        fs::write(config.grid_dir.join(".gfs.t06z.partial"), b"x").unwrap();
        fs::write(config.observation_dir.join("metars.cache.csv"), b"x").unwrap();

        let mut scanner = Scanner::new(&config);
        let jobs = scanner.scan();

        assert_eq!(jobs.len(), 3);
        let grid_products: Vec<_> = jobs
            .iter()
            .filter_map(|j| match j {
                DecodeJob::Grid { product, .. } => Some(product.name.as_str()),
                _ => None,
            })
            .collect();
        // Byte order puts the upper-case WAFS name first
        assert_eq!(grid_products, vec!["wafs", "gfs"]);
        assert!(matches!(jobs[2], DecodeJob::Observations { .. }));
    }

    #[test]
    fn test_rescan_skips_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        fs::create_dir_all(&config.observation_dir).unwrap();
        let feed = config.observation_dir.join("vatsim.txt");
        fs::write(&feed, b"x").unwrap();

        let mut scanner = Scanner::new(&config);
        assert_eq!(scanner.scan().len(), 1);
        assert!(scanner.scan().is_empty());

        scanner.forget(&feed);
        assert_eq!(scanner.scan().len(), 1);
    }

    #[test]
    fn test_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut scanner = Scanner::new(&config_for(dir.path()));
        assert!(scanner.scan().is_empty());
    }
}
