use std::fmt;

use anyhow::anyhow;
use semver::Version;

use crate::naming::is_commit_hash;

/// Version of one physical pack copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionKind {
    Unknown,
    Nightly,
    Release(Version),
}

impl VersionKind {
    pub fn release(&self) -> Option<&Version> {
        match self {
            Self::Release(version) => Some(version),
            _ => None,
        }
    }

    /// Tag used in inactive directory names: `nightly`, `unknown` or `1_0_2`.
    pub fn tag(&self) -> String {
        match self {
            Self::Unknown => "unknown".to_string(),
            Self::Nightly => "nightly".to_string(),
            Self::Release(version) => version.to_string().replace('.', "_"),
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" => None,
            "unknown" => Some(Self::Unknown),
            "nightly" => Some(Self::Nightly),
            other => parse_release_version(&other.replace('_', ".")).map(Self::Release),
        }
    }
}

impl fmt::Display for VersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::Nightly => f.write_str("nightly"),
            Self::Release(version) => write!(f, "{version}"),
        }
    }
}

/// Requested version in `name@spec` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Latest,
    Nightly,
    Unknown,
    Exact(Version),
    /// Full 40-hex git commit; installs the nightly tree at that commit.
    Commit(String),
}

impl VersionSpec {
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "latest" => return Ok(Self::Latest),
            "nightly" => return Ok(Self::Nightly),
            "unknown" => return Ok(Self::Unknown),
            _ => {}
        }
        if is_commit_hash(trimmed) {
            return Ok(Self::Commit(trimmed.to_ascii_lowercase()));
        }
        parse_release_version(trimmed)
            .map(Self::Exact)
            .ok_or_else(|| anyhow!("invalid version spec '{trimmed}'"))
    }

    /// Concrete kind this spec pins down, if it pins one without a registry query.
    pub fn as_kind(&self) -> Option<VersionKind> {
        match self {
            Self::Latest => None,
            Self::Nightly | Self::Commit(_) => Some(VersionKind::Nightly),
            Self::Unknown => Some(VersionKind::Unknown),
            Self::Exact(version) => Some(VersionKind::Release(version.clone())),
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Nightly => f.write_str("nightly"),
            Self::Unknown => f.write_str("unknown"),
            Self::Exact(version) => write!(f, "{version}"),
            Self::Commit(hash) => f.write_str(hash),
        }
    }
}

/// Parses release versions leniently: `v1.2`, `1`, `1.2.3-rc1` are all accepted.
pub fn parse_release_version(input: &str) -> Option<Version> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let parts = trimmed.split('.').collect::<Vec<_>>();
    if parts.len() > 3 {
        return None;
    }
    let mut numbers = [0_u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}
