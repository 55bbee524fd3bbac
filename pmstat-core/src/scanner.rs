use pmstat_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One input file, aggregated as one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPath {
    pub path: PathBuf,
}

fn is_partition_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("csv") | Some("CSV")
    )
}

pub fn scan_directory(base: &Path) -> Result<Vec<PartitionPath>> {
    let mut results = Vec::new();
    scan_recursive(base, &mut results)?;
    results.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(results)
}

fn scan_recursive(dir: &Path, out: &mut Vec<PartitionPath>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            scan_recursive(&path, out)?;
        } else if is_partition_file(&path) {
            out.push(PartitionPath { path });
        }
    }
    Ok(())
}

/// Resolve a path string: single file (any extension), directory of `*.csv`, or glob pattern.
pub fn resolve_paths(input: &str) -> Result<Vec<PartitionPath>> {
    let path = Path::new(input);
    if path.is_file() {
        return Ok(vec![PartitionPath {
            path: path.to_path_buf(),
        }]);
    }
    if path.is_dir() {
        return scan_directory(path);
    }
    let mut results = Vec::new();
    if let Ok(entries) = glob::glob(input) {
        for entry in entries.flatten() {
            if entry.is_file() && is_partition_file(&entry) {
                results.push(PartitionPath { path: entry });
            }
        }
    }
    Ok(results)
}
