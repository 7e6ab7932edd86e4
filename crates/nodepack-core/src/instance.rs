use std::path::PathBuf;

use crate::naming::{compact_url, normalize_id};
use crate::version::VersionKind;

/// One physical copy of a pack on disk. A different version lives in a
/// different directory, so `version` never changes for a given path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInstance {
    pub id: String,
    pub path: PathBuf,
    pub active: bool,
    pub version: VersionKind,
    pub repo_url: Option<String>,
    pub original_name: Option<String>,
}

impl PackInstance {
    pub fn is_release(&self) -> bool {
        matches!(self.version, VersionKind::Release(_))
    }

    pub fn is_nightly(&self) -> bool {
        self.version == VersionKind::Nightly
    }

    pub fn is_unknown(&self) -> bool {
        self.version == VersionKind::Unknown
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn normalized_id(&self) -> String {
        normalize_id(&self.id)
    }

    pub fn compact_repo_url(&self) -> Option<String> {
        self.repo_url.as_deref().map(compact_url)
    }

    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}
