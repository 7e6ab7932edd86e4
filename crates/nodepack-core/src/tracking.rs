use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path};

use anyhow::{Context, Result};

pub const TRACKING_MANIFEST_FILE: &str = ".tracking";

/// Entries removed by one garbage collection pass, relative to the pack dir.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarbagePlan {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

impl GarbagePlan {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}

pub fn read_tracking_manifest(pack_dir: &Path) -> Result<Option<BTreeSet<String>>> {
    let path = pack_dir.join(TRACKING_MANIFEST_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed reading tracking manifest: {}", path.display()))
        }
    };

    Ok(Some(
        content
            .lines()
            .map(normalize_entry)
            .filter(|entry| !entry.is_empty())
            .collect(),
    ))
}

pub fn write_tracking_manifest(pack_dir: &Path, entries: &BTreeSet<String>) -> Result<()> {
    let path = pack_dir.join(TRACKING_MANIFEST_FILE);
    let mut content = String::new();
    for entry in entries {
        let entry = normalize_entry(entry);
        if entry.is_empty() {
            continue;
        }
        content.push_str(&entry);
        content.push('\n');
    }
    fs::write(&path, content)
        .with_context(|| format!("failed writing tracking manifest: {}", path.display()))
}

/// Removes `previous - current` from `pack_dir`: files first, then directories
/// that are left empty, deepest first. Entries already gone are skipped, so a
/// second pass over the same sets removes nothing.
pub fn collect_garbage(
    pack_dir: &Path,
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> Result<GarbagePlan> {
    let current = current
        .iter()
        .map(|entry| normalize_entry(entry))
        .collect::<BTreeSet<_>>();
    let mut plan = GarbagePlan::default();
    let mut directories = Vec::new();

    for entry in previous.iter().map(|entry| normalize_entry(entry)) {
        if entry.is_empty() || current.contains(&entry) || !is_contained(&entry) {
            continue;
        }
        let path = pack_dir.join(&entry);
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("failed to stat {}", path.display()))
            }
        };
        if metadata.is_dir() {
            directories.push(entry);
            continue;
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed removing stale file: {}", path.display()))?;
        plan.files.push(entry);
    }

    directories.sort_by_key(|entry| std::cmp::Reverse(entry.matches('/').count()));
    for entry in directories {
        let path = pack_dir.join(&entry);
        let is_empty = fs::read_dir(&path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .next()
            .is_none();
        if !is_empty {
            continue;
        }
        fs::remove_dir(&path)
            .with_context(|| format!("failed removing stale directory: {}", path.display()))?;
        plan.directories.push(entry);
    }

    Ok(plan)
}

fn normalize_entry(entry: &str) -> String {
    entry.trim().replace('\\', "/").trim_matches('/').to_string()
}

fn is_contained(entry: &str) -> bool {
    Path::new(entry)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}
