use anyhow::{Context, Result};
use nodepack_core::{is_url_like, normalize_id, repository_name, VersionKind};
use std::fs;
use std::path::{Path, PathBuf};

pub const DISABLED_DIR_NAME: &str = ".disabled";
pub const LEGACY_DISABLED_SUFFIX: &str = ".disabled";
const IGNORED_DIR_NAMES: [&str; 1] = ["__pycache__"];

/// Directory layout under one pack root:
///
/// ```text
/// <root>/<Name>/                       active instances
/// <root>/.disabled/<id>@<tag>/         inactive instances
/// <root>/.recovery/pending.jsonl       deferred deletes and moves
/// <root>/.staging/                     downloads in flight
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    root: PathBuf,
}

impl PackLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn disabled_dir(&self) -> PathBuf {
        self.root.join(DISABLED_DIR_NAME)
    }

    pub fn recovery_dir(&self) -> PathBuf {
        self.root.join(".recovery")
    }

    pub fn default_recovery_log_path(&self) -> PathBuf {
        self.recovery_dir().join("pending.jsonl")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging")
    }

    pub fn active_path(&self, dir_name: &str) -> PathBuf {
        self.root.join(dir_name)
    }

    pub fn inactive_path(&self, id: &str, version: &VersionKind) -> PathBuf {
        self.disabled_dir()
            .join(format!("{}@{}", inactive_stem(id), version.tag()))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.disabled_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Lower-cased name used before `@` in inactive directories. Compact URL ids
/// contribute their repository name.
pub fn inactive_stem(id: &str) -> String {
    if id.contains('/') || is_url_like(id) {
        normalize_id(&repository_name(id))
    } else {
        normalize_id(id)
    }
}

/// Splits `<id>@<tag>`; a name without a decodable tag keeps its full text as id.
pub fn parse_inactive_dir_name(name: &str) -> (String, Option<VersionKind>) {
    match name.rsplit_once('@') {
        Some((stem, tag)) if !stem.is_empty() => match VersionKind::from_tag(tag) {
            Some(kind) => (stem.to_string(), Some(kind)),
            None => (name.to_string(), None),
        },
        _ => (name.to_string(), None),
    }
}

/// Root entries that can never hold a pack.
pub fn is_reserved_dir_name(name: &str) -> bool {
    name.starts_with('.') || IGNORED_DIR_NAMES.contains(&name)
}
