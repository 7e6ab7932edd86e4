use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::version::parse_release_version;

pub const RELEASE_METADATA_FILE: &str = "pyproject.toml";

/// Declared identity of a registry release, read from `pyproject.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub name: String,
    pub version: Version,
    pub repository: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PyProjectDocument {
    project: Option<ProjectTable>,
}

#[derive(Debug, Deserialize)]
struct ProjectTable {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    urls: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct PyProjectOut<'a> {
    project: ProjectOut<'a>,
}

#[derive(Debug, Serialize)]
struct ProjectOut<'a> {
    name: &'a str,
    version: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    urls: BTreeMap<&'static str, &'a str>,
}

impl ReleaseMetadata {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let document: PyProjectDocument =
            toml::from_str(input).context("failed to parse release metadata")?;
        let project = document
            .project
            .ok_or_else(|| anyhow!("release metadata has no [project] table"))?;

        let name = project.name.unwrap_or_default().trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("release metadata project name must not be empty"));
        }
        let raw_version = project
            .version
            .ok_or_else(|| anyhow!("release metadata for '{name}' has no version"))?;
        let version = parse_release_version(&raw_version).ok_or_else(|| {
            anyhow!("release metadata for '{name}' has invalid version '{raw_version}'")
        })?;
        let repository = project
            .urls
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("repository"))
            .map(|(_, url)| url.trim().to_string())
            .filter(|url| !url.is_empty());

        Ok(Self {
            name,
            version,
            repository,
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let mut urls = BTreeMap::new();
        if let Some(repository) = &self.repository {
            urls.insert("Repository", repository.as_str());
        }
        toml::to_string(&PyProjectOut {
            project: ProjectOut {
                name: &self.name,
                version: self.version.to_string(),
                urls,
            },
        })
        .context("failed to serialize release metadata")
    }
}

pub fn read_release_metadata(pack_dir: &Path) -> Result<Option<ReleaseMetadata>> {
    let path = pack_dir.join(RELEASE_METADATA_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed reading release metadata: {}", path.display()))
        }
    };
    ReleaseMetadata::from_toml_str(&content)
        .with_context(|| format!("failed parsing release metadata: {}", path.display()))
        .map(Some)
}

pub fn write_release_metadata(pack_dir: &Path, metadata: &ReleaseMetadata) -> Result<()> {
    let path = pack_dir.join(RELEASE_METADATA_FILE);
    fs::write(&path, metadata.to_toml_string()?)
        .with_context(|| format!("failed writing release metadata: {}", path.display()))
}
