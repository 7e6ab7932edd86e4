use anyhow::{bail, Result};
use nodepack_core::{
    is_url_like, split_pack_request, PackError, PackInstance, VersionKind, VersionSpec,
};
use semver::Version;

use crate::select::{highest_release, select_active, select_inactive};
use crate::types::{PackRequest, ResolveScope};

pub fn parse_pack_request(input: &str) -> Result<PackRequest> {
    let (id, spec) = split_pack_request(input);
    if id.is_empty() {
        bail!("pack request '{input}' does not name a pack");
    }
    let spec = spec.map(|raw| VersionSpec::parse(&raw)).transpose()?;
    Ok(PackRequest { id, spec })
}

/// Turns a request into a concrete version kind.
///
/// URL-like ids always mean the nightly build. An explicit spec wins over
/// the scope; `latest` needs `registry_latest`. Without a spec:
///
/// * `Active`: the version of the enabled instance.
/// * `Inactive`: highest disabled release, else nightly, else unknown.
/// * `Global`: highest release on disk or in the registry, else nightly.
pub fn resolve_version(
    id: &str,
    instances: &[PackInstance],
    spec: Option<&VersionSpec>,
    scope: ResolveScope,
    registry_latest: Option<&Version>,
) -> Result<VersionKind, PackError> {
    if is_url_like(id) {
        return Ok(VersionKind::Nightly);
    }

    if let Some(spec) = spec {
        return match spec {
            VersionSpec::Latest => registry_latest
                .cloned()
                .map(VersionKind::Release)
                .ok_or_else(|| PackError::not_found(format!("no registry release of '{id}'"))),
            VersionSpec::Nightly | VersionSpec::Commit(_) => Ok(VersionKind::Nightly),
            VersionSpec::Unknown => Ok(VersionKind::Unknown),
            VersionSpec::Exact(version) => Ok(VersionKind::Release(version.clone())),
        };
    }

    match scope {
        ResolveScope::Active => select_active(instances)
            .map(|instance| instance.version.clone())
            .ok_or_else(|| PackError::not_found(format!("'{id}' is not enabled"))),
        ResolveScope::Inactive => select_inactive(instances, None)
            .map(|instance| instance.version.clone())
            .ok_or_else(|| PackError::not_found(format!("'{id}' has no disabled instance"))),
        ResolveScope::Global => {
            let local = highest_release(instances).and_then(|instance| instance.version.release());
            let best = match (local, registry_latest) {
                (Some(local), Some(remote)) if remote > local => Some(remote),
                (Some(local), _) => Some(local),
                (None, remote) => remote,
            };
            if let Some(version) = best {
                return Ok(VersionKind::Release(version.clone()));
            }
            if instances.iter().any(PackInstance::is_nightly) {
                return Ok(VersionKind::Nightly);
            }
            Err(PackError::not_found(format!("no known version of '{id}'")))
        }
    }
}
