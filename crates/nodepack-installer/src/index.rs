use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nodepack_core::{
    compact_url, is_url_like, normalize_id, NormalizedKeyMap, PackInstance,
};
use nodepack_registry::Registry;
use tracing::debug;

use crate::classify::{classify, Slot};
use crate::layout::{is_reserved_dir_name, PackLayout, LEGACY_DISABLED_SUFFIX};
use crate::vcs::Vcs;

/// Snapshot of every pack instance under one root. Always rebuilt by a full
/// scan; never patched after an operation.
#[derive(Debug, Clone, Default)]
pub struct PackIndex {
    instances: Vec<PackInstance>,
    by_id: NormalizedKeyMap<Vec<usize>>,
    by_repo_url: BTreeMap<String, Vec<usize>>,
}

impl PackIndex {
    pub fn scan(layout: &PackLayout, vcs: &dyn Vcs, registry: &dyn Registry) -> Result<Self> {
        let mut index = Self::default();

        for path in sorted_dirs(layout.root())? {
            let Some(name) = path.file_name().map(|name| name.to_string_lossy().to_string())
            else {
                continue;
            };
            if is_reserved_dir_name(&name) {
                continue;
            }
            let slot = if name.len() > LEGACY_DISABLED_SUFFIX.len()
                && name.ends_with(LEGACY_DISABLED_SUFFIX)
            {
                Slot::LegacyInactive
            } else {
                Slot::Active
            };
            if let Some(instance) = classify(&path, slot, vcs, registry) {
                index.push(instance);
            }
        }

        let disabled_dir = layout.disabled_dir();
        if disabled_dir.is_dir() {
            for path in sorted_dirs(&disabled_dir)? {
                if let Some(instance) = classify(&path, Slot::Inactive, vcs, registry) {
                    index.push(instance);
                }
            }
        }

        debug!(
            root = %layout.root().display(),
            instances = index.instances.len(),
            ids = index.by_id.len(),
            "scanned pack root"
        );
        Ok(index)
    }

    fn push(&mut self, instance: PackInstance) {
        debug!(
            id = %instance.id,
            version = %instance.version,
            active = instance.active,
            path = %instance.path.display(),
            "indexed pack instance"
        );
        let position = self.instances.len();
        self.by_id
            .get_or_insert_with(&instance.id, Vec::new)
            .push(position);
        if let Some(compact) = instance.compact_repo_url() {
            self.by_repo_url
                .entry(normalize_id(&compact))
                .or_default()
                .push(position);
        }
        self.instances.push(instance);
    }

    /// All instances in scan order: active slots first, then the inactive subtree.
    pub fn instances(&self) -> &[PackInstance] {
        &self.instances
    }

    fn id_positions(&self, id: &str) -> &[usize] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    fn repository_positions(&self, repository: &str) -> &[usize] {
        self.by_repo_url
            .get(&normalize_id(&compact_url(repository)))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Original-cased ids in normalized order.
    pub fn ids(&self) -> Vec<&str> {
        self.by_id.iter().map(|(id, _)| id).collect()
    }

    /// Every instance of the logical pack `id`: direct hits plus instances
    /// that share its repository, whichever identity they were indexed under.
    pub fn instances_for(&self, id: &str, registry: &dyn Registry) -> Vec<PackInstance> {
        let url_request = is_url_like(id);
        let key = if url_request {
            compact_url(id)
        } else {
            id.trim().to_string()
        };

        let mut positions: BTreeSet<usize> = self.id_positions(&key).iter().copied().collect();
        let repository = if url_request {
            Some(key.clone())
        } else {
            positions
                .iter()
                .find_map(|&position| self.instances[position].repo_url.clone())
                .or_else(|| self.compact_id_for_repository_name(&key))
                .or_else(|| registry_repository(registry, &key))
        };
        if let Some(repository) = repository {
            positions.extend(self.id_positions(&compact_url(&repository)));
            positions.extend(self.repository_positions(&repository));
        }

        positions
            .into_iter()
            .map(|position| self.instances[position].clone())
            .collect()
    }

    /// Indexed `owner/Name` id whose `Name` normalizes to `name`.
    fn compact_id_for_repository_name(&self, name: &str) -> Option<String> {
        let wanted = normalize_id(name);
        self.ids().into_iter().find_map(|id| match id.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && normalize_id(repo) == wanted => {
                Some(id.to_string())
            }
            _ => None,
        })
    }
}

fn registry_repository(registry: &dyn Registry, id: &str) -> Option<String> {
    match registry.lookup(id) {
        Ok(package) => package.and_then(|package| package.repository),
        Err(err) => {
            debug!(id, error = %format!("{err:#}"), "registry lookup failed during pack lookup");
            None
        }
    }
}

fn sorted_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
