use std::path::Path;

use nodepack_core::{
    compact_url, read_release_metadata, read_tracking_manifest, repository_name, PackInstance,
    VersionKind,
};
use nodepack_registry::Registry;
use tracing::{debug, warn};

use crate::layout::{parse_inactive_dir_name, LEGACY_DISABLED_SUFFIX};
use crate::vcs::Vcs;

/// Where a scanned directory sits in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Active,
    /// `<root>/.disabled/<id>@<tag>`
    Inactive,
    /// `<root>/<name>.disabled`
    LegacyInactive,
}

/// Identifies the pack stored at `path`, or `None` when it is not a directory.
///
/// A working tree is a nightly build, a directory with release metadata and a
/// tracking manifest is a registry release. Anything else is named after its
/// directory and keeps the version of its `<id>@<tag>` name, else unknown.
pub fn classify(
    path: &Path,
    slot: Slot,
    vcs: &dyn Vcs,
    registry: &dyn Registry,
) -> Option<PackInstance> {
    if !path.is_dir() {
        return None;
    }
    let dir_name = path.file_name()?.to_string_lossy().to_string();
    let (stem, tagged) = match slot {
        Slot::Active => (dir_name.clone(), None),
        Slot::Inactive => parse_inactive_dir_name(&dir_name),
        Slot::LegacyInactive => (
            dir_name
                .strip_suffix(LEGACY_DISABLED_SUFFIX)
                .unwrap_or(&dir_name)
                .to_string(),
            None,
        ),
    };
    let active = slot == Slot::Active;

    if vcs.is_work_tree(path) {
        return Some(classify_work_tree(path, active, stem, vcs, registry));
    }

    match (read_release_metadata(path), read_tracking_manifest(path)) {
        (Ok(Some(metadata)), Ok(Some(_))) => {
            return Some(PackInstance {
                id: metadata.name.clone(),
                path: path.to_path_buf(),
                active,
                version: VersionKind::Release(metadata.version),
                repo_url: metadata.repository,
                original_name: Some(metadata.name),
            });
        }
        (Err(err), _) | (_, Err(err)) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "unreadable pack metadata, treating as unknown");
        }
        _ => {}
    }

    Some(PackInstance {
        id: stem.clone(),
        path: path.to_path_buf(),
        active,
        version: tagged.unwrap_or(VersionKind::Unknown),
        repo_url: None,
        original_name: if active { Some(stem) } else { None },
    })
}

fn classify_work_tree(
    path: &Path,
    active: bool,
    stem: String,
    vcs: &dyn Vcs,
    registry: &dyn Registry,
) -> PackInstance {
    let remote = match vcs.remote_url(path) {
        Ok(remote) => remote,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed reading remote url");
            None
        }
    };

    let id = match &remote {
        Some(remote) => {
            let compact = compact_url(remote);
            match registry.lookup_by_repository(&compact) {
                Ok(Some(package)) => package.id,
                Ok(None) => compact,
                Err(err) => {
                    debug!(repository = %compact, error = %format!("{err:#}"), "registry lookup failed during scan");
                    compact
                }
            }
        }
        None => stem.clone(),
    };
    let original_name = if active {
        Some(stem)
    } else {
        remote.as_deref().map(repository_name)
    };

    PackInstance {
        id,
        path: path.to_path_buf(),
        active,
        version: VersionKind::Nightly,
        repo_url: remote,
        original_name,
    }
}
