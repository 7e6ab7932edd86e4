use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use nodepack_core::{compact_url, normalize_id, parse_release_version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Registry, RegistryPackage, RegistryRelease};

/// One `index/<id>/<version>.toml` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryManifest {
    pub id: String,
    pub name: Option<String>,
    pub version: String,
    pub download_url: String,
    pub sha256: Option<String>,
    pub repository: Option<String>,
}

impl RegistryManifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse registry manifest")?;
        if manifest.id.trim().is_empty() {
            return Err(anyhow!("registry manifest id must not be empty"));
        }
        if parse_release_version(&manifest.version).is_none() {
            return Err(anyhow!(
                "registry manifest '{}' has invalid version '{}'",
                manifest.id,
                manifest.version
            ));
        }
        if manifest.download_url.trim().is_empty() {
            return Err(anyhow!(
                "registry manifest '{}' has empty download_url",
                manifest.id
            ));
        }
        Ok(manifest)
    }
}

/// Registry backed by a local directory tree:
/// `<root>/index/<id>/<version>.toml`.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_root(&self) -> PathBuf {
        self.root.join("index")
    }

    fn package_dirs(&self) -> Result<Vec<PathBuf>> {
        let index_root = self.index_root();
        if !index_root.exists() {
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&index_root)
            .with_context(|| format!("failed to read registry index: {}", index_root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn find_package_dir(&self, id: &str) -> Result<Option<PathBuf>> {
        let wanted = normalize_id(id);
        Ok(self.package_dirs()?.into_iter().find(|dir| {
            dir.file_name()
                .map(|name| normalize_id(&name.to_string_lossy()) == wanted)
                .unwrap_or(false)
        }))
    }

    fn load_package(&self, package_dir: &Path) -> Result<Option<RegistryPackage>> {
        let mut manifests = Vec::new();
        for entry in fs::read_dir(package_dir).with_context(|| {
            format!(
                "failed to read package directory: {}",
                package_dir.display()
            )
        })? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("toml") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed reading manifest: {}", path.display()))?;
            let manifest = RegistryManifest::from_toml_str(&content)
                .with_context(|| format!("failed parsing manifest: {}", path.display()))?;
            manifests.push(manifest);
        }

        let Some(first) = manifests.first() else {
            return Ok(None);
        };
        let id = first.id.clone();
        let name = first.name.clone().unwrap_or_else(|| id.clone());
        let repository = manifests.iter().find_map(|m| m.repository.clone());

        let mut releases = manifests
            .into_iter()
            .filter_map(|manifest| {
                parse_release_version(&manifest.version).map(|version| RegistryRelease {
                    version,
                    download_url: manifest.download_url,
                    sha256: manifest.sha256,
                })
            })
            .collect::<Vec<_>>();
        releases.sort_by(|a, b| b.version.cmp(&a.version));

        Ok(Some(RegistryPackage {
            id,
            name,
            repository,
            releases,
        }))
    }
}

impl Registry for FsRegistry {
    fn lookup(&self, id: &str) -> Result<Option<RegistryPackage>> {
        match self.find_package_dir(id)? {
            Some(dir) => self.load_package(&dir),
            None => Ok(None),
        }
    }

    fn lookup_by_repository(&self, compact: &str) -> Result<Option<RegistryPackage>> {
        let wanted = normalize_id(&compact_url(compact));
        for dir in self.package_dirs()? {
            let Some(package) = self.load_package(&dir)? else {
                continue;
            };
            let matches = package
                .repository
                .as_deref()
                .map(|repository| normalize_id(&compact_url(repository)) == wanted)
                .unwrap_or(false);
            if matches {
                debug!(repository = %compact, id = %package.id, "registry matched repository");
                return Ok(Some(package));
            }
        }
        Ok(None)
    }
}
