use anyhow::Result;
use semver::Version;

mod fs_index;

pub use fs_index::{FsRegistry, RegistryManifest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRelease {
    pub version: Version,
    pub download_url: String,
    pub sha256: Option<String>,
}

/// Registry view of one pack. `releases` is sorted newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPackage {
    pub id: String,
    pub name: String,
    pub repository: Option<String>,
    pub releases: Vec<RegistryRelease>,
}

impl RegistryPackage {
    pub fn latest_version(&self) -> Option<&Version> {
        self.releases
            .iter()
            .map(|release| &release.version)
            .max()
    }

    pub fn release(&self, version: &Version) -> Option<&RegistryRelease> {
        self.releases
            .iter()
            .find(|release| &release.version == version)
    }
}

/// Registry the lifecycle engine consults. `Ok(None)` means the registry
/// answered and does not know the pack; `Err` means it could not answer.
pub trait Registry {
    fn lookup(&self, id: &str) -> Result<Option<RegistryPackage>>;

    /// Looks a pack up by compact repository URL (`owner/repo`).
    fn lookup_by_repository(&self, compact_url: &str) -> Result<Option<RegistryPackage>>;
}

/// Offline stand-in that knows no packs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

impl Registry for NoRegistry {
    fn lookup(&self, _id: &str) -> Result<Option<RegistryPackage>> {
        Ok(None)
    }

    fn lookup_by_repository(&self, _compact_url: &str) -> Result<Option<RegistryPackage>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests;
