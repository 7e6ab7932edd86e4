use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use nodepack_core::{
    collect_garbage, compact_url, is_url_like, normalize_git_url, read_release_metadata,
    read_tracking_manifest, repository_name, write_release_metadata, write_tracking_manifest,
    PackError, PackInstance, ReleaseMetadata, VersionKind, VersionSpec,
};
use nodepack_registry::{RegistryPackage, RegistryRelease};
use nodepack_resolver::{resolve_version, select_active, select_inactive, ResolveScope};
use nodepack_security::verify_sha256_file;
use tracing::{debug, info};

use crate::fs_utils::{discard_path, relocate_dir, unique_suffix};
use crate::manager::PackManager;
use crate::types::{Action, Outcome, PostInstallReport, SkipReason};
use crate::vcs::{UpdateStatus, VcsError};

/// How a release replaces another active release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Disable the active instance, then fetch into a fresh slot.
    Archive,
    /// Overwrite the active release's slot and collect its stale files.
    InPlace,
}

struct Plan<'p> {
    action: Action,
    id: &'p str,
    target: VersionKind,
    commit: Option<&'p str>,
    placement: Placement,
}

impl PackManager<'_> {
    /// Installs `id` at `spec`. Without a spec an enabled pack is left alone
    /// and a disabled one is enabled again; only a pack with nothing on disk
    /// gets the highest known release, else the nightly build.
    pub fn install(&mut self, id: &str, spec: Option<&VersionSpec>) -> Result<Outcome, PackError> {
        self.settled(|manager| manager.install_pack(id, spec))
    }

    /// Moves an installed pack to another version, reusing disabled
    /// instances when possible. Release upgrades happen in place.
    pub fn switch_version(&mut self, id: &str, spec: &VersionSpec) -> Result<Outcome, PackError> {
        self.settled(|manager| manager.switch_with_action(Action::Switch, id, spec))
    }

    /// Pulls the active nightly build, or moves the active release to the
    /// registry's latest.
    pub fn update(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.settled(|manager| manager.update_pack(id))
    }

    fn install_pack(&mut self, id: &str, spec: Option<&VersionSpec>) -> Result<Outcome, PackError> {
        self.ensure_not_protected(id)?;
        if is_url_like(id) {
            return self.install_from_url(id, spec);
        }

        self.rebuild()?;
        let instances = self.instances_for(id);
        if spec.is_none() {
            if let Some(active) = select_active(&instances) {
                return Ok(
                    Outcome::skipped(Action::Install, id, SkipReason::AlreadyInstalled)
                        .with_instance(&active.version, &active.path),
                );
            }
        }
        let target = self.resolve_target(id, &instances, spec)?;
        self.apply(
            Plan {
                action: Action::Install,
                id,
                target,
                commit: commit_of(spec),
                placement: Placement::Archive,
            },
            &instances,
        )
    }

    fn update_pack(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.rebuild()?;
        let instances = self.instances_for(id);
        let Some(active) = select_active(&instances).cloned() else {
            return Err(PackError::not_found(format!("'{id}' is not enabled")));
        };

        match &active.version {
            VersionKind::Nightly => {
                let status = self.update_work_tree(&active.path)?;
                if status == UpdateStatus::UpToDate {
                    return Ok(Outcome::skipped(Action::Update, id, SkipReason::UpToDate)
                        .with_instance(&active.version, &active.path));
                }
                let mut outcome =
                    Outcome::new(Action::Update, id).with_instance(&active.version, &active.path);
                self.run_post_install(&active.path, &mut outcome);
                info!(id, path = %active.path.display(), "updated nightly pack");
                Ok(outcome)
            }
            VersionKind::Release(current) => {
                let registry_id = self.registry_id_for(id, &active)?;
                let latest = self.registry_latest(&registry_id)?.ok_or_else(|| {
                    PackError::not_found(format!("'{id}' has no registry releases"))
                })?;
                if &latest <= current {
                    return Ok(Outcome::skipped(Action::Update, id, SkipReason::UpToDate)
                        .with_instance(&active.version, &active.path));
                }
                self.switch_with_action(Action::Update, &registry_id, &VersionSpec::Exact(latest))
            }
            VersionKind::Unknown => Err(PackError::not_found(format!(
                "'{id}' has an unknown version and no update channel"
            ))),
        }
    }

    /// Reruns post-install for the active instance.
    pub fn fix(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.rebuild()?;
        let Some(active) = self.active_instance(id) else {
            return Err(PackError::not_found(format!("'{id}' is not enabled")));
        };
        self.services
            .post_install
            .run(&active.path)
            .map_err(|err| PackError::upstream(format!("post-install for '{id}' failed"), err))?;
        let mut outcome =
            Outcome::new(Action::Fix, id).with_instance(&active.version, &active.path);
        outcome.post_install = Some(PostInstallReport::Succeeded);
        Ok(outcome)
    }

    fn switch_with_action(
        &mut self,
        action: Action,
        id: &str,
        spec: &VersionSpec,
    ) -> Result<Outcome, PackError> {
        let id = if is_url_like(id) {
            self.registered_id_for_url(id)?
                .ok_or_else(|| PackError::not_found(format!("'{id}' is not a registered pack")))?
        } else {
            id.to_string()
        };

        self.rebuild()?;
        let instances = self.instances_for(&id);
        if instances.is_empty() {
            return Err(PackError::not_found(format!("'{id}' is not installed")));
        }
        let target = self.resolve_target(&id, &instances, Some(spec))?;
        self.apply(
            Plan {
                action,
                id: &id,
                target,
                commit: commit_of(Some(spec)),
                placement: Placement::InPlace,
            },
            &instances,
        )
    }

    fn install_from_url(
        &mut self,
        url: &str,
        spec: Option<&VersionSpec>,
    ) -> Result<Outcome, PackError> {
        let nightly = match spec {
            Some(spec @ VersionSpec::Commit(_)) => spec.clone(),
            _ => VersionSpec::Nightly,
        };
        if let Some(registered) = self.registered_id_for_url(url)? {
            debug!(url, id = %registered, "url maps to registry pack");
            return self.install_pack(&registered, Some(&nightly));
        }
        if !self.config().allow_unregistered_git {
            return Err(PackError::conflict(format!(
                "installing unregistered repository '{url}' is disabled"
            )));
        }

        self.rebuild()?;
        let instances = self.instances_for(url);
        self.apply(
            Plan {
                action: Action::Install,
                id: url,
                target: VersionKind::Nightly,
                commit: commit_of(Some(&nightly)),
                placement: Placement::Archive,
            },
            &instances,
        )
    }

    fn registered_id_for_url(&self, url: &str) -> Result<Option<String>, PackError> {
        let compact = compact_url(url);
        self.services
            .registry
            .lookup_by_repository(&compact)
            .map(|package| package.map(|package| package.id))
            .map_err(|err| PackError::upstream(format!("registry lookup for '{compact}' failed"), err))
    }

    /// Registry id for an installed release, which may be indexed under a
    /// differently cased name.
    fn registry_id_for(&self, id: &str, active: &PackInstance) -> Result<String, PackError> {
        if self.registry_package(id)?.is_some() {
            return Ok(id.to_string());
        }
        if let Some(repository) = &active.repo_url {
            if let Some(registered) = self.registered_id_for_url(repository)? {
                return Ok(registered);
            }
        }
        Err(PackError::not_found(format!("'{id}' is not in the registry")))
    }

    fn resolve_target(
        &self,
        id: &str,
        instances: &[PackInstance],
        spec: Option<&VersionSpec>,
    ) -> Result<VersionKind, PackError> {
        // Without a spec anything on disk is enabled again rather than fetched.
        let scope = if spec.is_none() && !instances.is_empty() {
            ResolveScope::Inactive
        } else {
            ResolveScope::Global
        };
        let registry_latest = match (spec, scope) {
            (Some(VersionSpec::Latest), _) => self.registry_latest(id)?,
            (None, ResolveScope::Global) => match self.registry_latest(id) {
                Ok(latest) => latest,
                Err(err) => {
                    debug!(id, error = %err, "registry unavailable while resolving");
                    None
                }
            },
            _ => None,
        };
        match resolve_version(id, instances, spec, scope, registry_latest.as_ref()) {
            Err(PackError::NotFound(_)) if spec.is_none() && self.has_registry_repository(id) => {
                Ok(VersionKind::Nightly)
            }
            resolved => resolved,
        }
    }

    fn has_registry_repository(&self, id: &str) -> bool {
        matches!(
            self.registry_package(id),
            Ok(Some(RegistryPackage { repository: Some(_), .. }))
        )
    }

    fn apply(&self, plan: Plan<'_>, instances: &[PackInstance]) -> Result<Outcome, PackError> {
        let Plan {
            action,
            id,
            target,
            commit,
            placement,
        } = plan;
        let active = select_active(instances).cloned();
        let mut outcome = Outcome::new(action, id);
        outcome.version = Some(target.clone());

        if let Some(active) = active.as_ref().filter(|active| active.version == target) {
            let Some(commit) = commit else {
                return Ok(Outcome::skipped(action, id, SkipReason::AlreadyInstalled)
                    .with_instance(&active.version, &active.path));
            };
            self.checkout_commit(&active.path, commit)?;
            outcome.path = Some(active.path.clone());
            self.run_post_install(&active.path, &mut outcome);
            return Ok(outcome);
        }

        if let Some(inactive) = select_inactive(instances, Some(&target)).cloned() {
            let destination = self.enable_destination(&inactive);
            let frees_destination = active
                .as_ref()
                .map(|active| active.path == destination)
                .unwrap_or(false);
            if destination.exists() && !frees_destination {
                return Err(PackError::conflict(format!(
                    "cannot enable '{id}' {target}: {} already exists",
                    destination.display()
                )));
            }
            if let Some(active) = &active {
                if !self.disable_instance(active, &mut outcome)? {
                    return Ok(outcome);
                }
            }
            if !self.enable_instance(&inactive, &mut outcome)? {
                return Ok(outcome);
            }
            if let Some(commit) = commit {
                self.checkout_commit(&destination, commit)?;
                self.run_post_install(&destination, &mut outcome);
            }
            info!(id, version = %target, "re-enabled disabled instance");
            return Ok(outcome);
        }

        let destination = match &target {
            VersionKind::Release(version) => {
                let package = self.registry_package(id)?.ok_or_else(|| {
                    PackError::not_found(format!("'{id}' is not in the registry"))
                })?;
                let release = package.release(version).cloned().ok_or_else(|| {
                    PackError::not_found(format!("'{id}' has no registry release {version}"))
                })?;

                let in_place = placement == Placement::InPlace;
                let destination = match &active {
                    Some(active) if in_place => active.path.clone(),
                    _ => self.layout().active_path(&package.name),
                };
                self.ensure_free(id, &destination, active.as_ref())?;
                let keep_slot = in_place && active.as_ref().is_some_and(PackInstance::is_release);
                let replaced = active.as_ref().filter(|_| !keep_slot);
                if !self.place_release(&destination, &package, &release, replaced, &mut outcome)? {
                    return Ok(outcome);
                }
                destination
            }
            VersionKind::Nightly => {
                let repository = self.repository_for(id, instances)?;
                let destination = self.layout().active_path(&repository_name(&repository));
                self.ensure_free(id, &destination, active.as_ref())?;
                let placed = self.place_nightly(
                    &repository,
                    &destination,
                    active.as_ref(),
                    commit,
                    &mut outcome,
                )?;
                if !placed {
                    return Ok(outcome);
                }
                destination
            }
            VersionKind::Unknown => {
                return Err(PackError::not_found(format!(
                    "'{id}' has no fetchable source for an unknown version"
                )))
            }
        };

        outcome.path = Some(destination.clone());
        self.run_post_install(&destination, &mut outcome);
        info!(id, version = %target, path = %destination.display(), "{action} placed new content");
        Ok(outcome)
    }

    /// A slot is free when it does not exist or belongs to the instance
    /// about to move out of it.
    fn ensure_free(
        &self,
        id: &str,
        destination: &Path,
        active: Option<&PackInstance>,
    ) -> Result<(), PackError> {
        let owned_by_active = active
            .map(|active| active.path == destination)
            .unwrap_or(false);
        if destination.exists() && !owned_by_active {
            return Err(PackError::conflict(format!(
                "cannot place '{id}': {} already exists",
                destination.display()
            )));
        }
        Ok(())
    }

    fn repository_for(&self, id: &str, instances: &[PackInstance]) -> Result<String, PackError> {
        if is_url_like(id) {
            return Ok(normalize_git_url(id));
        }
        let registered = match self.registry_package(id) {
            Ok(package) => package.and_then(|package| package.repository),
            Err(err) => {
                debug!(id, error = %err, "registry unavailable, using local repository url");
                None
            }
        };
        registered
            .or_else(|| instances.iter().find_map(|instance| instance.repo_url.clone()))
            .map(|repository| normalize_git_url(&repository))
            .ok_or_else(|| PackError::not_found(format!("no repository known for '{id}'")))
    }

    /// Disables the instance being replaced. `false` means its move was
    /// deferred and nothing new may be placed yet.
    fn retire(
        &self,
        replaced: Option<&PackInstance>,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        match replaced {
            Some(replaced) => self.disable_instance(replaced, outcome),
            None => Ok(true),
        }
    }

    /// Clones (and checks out `commit`) under the staging directory, so a
    /// failed clone leaves `replaced` enabled. Only then is `replaced`
    /// retired and the clone moved into `destination`.
    fn place_nightly(
        &self,
        repository: &str,
        destination: &Path,
        replaced: Option<&PackInstance>,
        commit: Option<&str>,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let staging = self.layout().staging_dir();
        fs::create_dir_all(&staging).map_err(|err| {
            PackError::io(format!("failed creating {}", staging.display()), err)
        })?;
        let staged = staging.join(format!("clone-{}", unique_suffix()));

        let prepared = self
            .services
            .vcs
            .clone_repo(repository, &staged)
            .map_err(|err| PackError::upstream(format!("failed cloning {repository}"), err))
            .and_then(|()| match commit {
                Some(commit) => self.checkout_commit(&staged, commit),
                None => Ok(()),
            });
        let placed = prepared.and_then(|()| match self.retire(replaced, outcome) {
            Ok(true) => relocate_dir(&staged, destination).map(|()| true).map_err(|err| {
                PackError::io(format!("failed moving clone into {}", destination.display()), err)
            }),
            other => other,
        });
        discard_path(&staged);
        placed
    }

    fn checkout_commit(&self, path: &Path, commit: &str) -> Result<(), PackError> {
        self.services.vcs.checkout(path, commit).map_err(|err| {
            PackError::upstream(format!("failed checking out {commit}"), err)
        })
    }

    /// Fetches with one remedy for the two recoverable git states.
    fn update_work_tree(&self, path: &Path) -> Result<UpdateStatus, PackError> {
        let vcs = self.services.vcs;
        let before = vcs.current_commit(path).ok();
        let result = match vcs.update(path) {
            Err(VcsError::DubiousOwnership { .. }) => vcs
                .trust_directory(path)
                .and_then(|_| vcs.update(path)),
            Err(VcsError::DetachedHead { .. }) => vcs
                .checkout_default_branch(path)
                .and_then(|_| vcs.update(path)),
            other => other,
        };
        let status = result.map_err(|err| {
            PackError::upstream(format!("failed updating {}", path.display()), err)
        })?;

        let moved = match (before, vcs.current_commit(path).ok()) {
            (Some(before), Some(after)) => before != after,
            _ => false,
        };
        Ok(if moved {
            UpdateStatus::Updated
        } else {
            status
        })
    }

    /// Downloads and verifies the release before anything on disk changes,
    /// then retires `replaced` and unpacks into `destination`. Returns
    /// `false` when retiring `replaced` was deferred.
    fn place_release(
        &self,
        destination: &Path,
        package: &RegistryPackage,
        release: &RegistryRelease,
        replaced: Option<&PackInstance>,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let archive = self.fetch_release(release)?;
        let placed = match self.retire(replaced, outcome) {
            Ok(true) => self
                .unpack_release(destination, package, release, &archive, outcome)
                .map(|()| true),
            other => other,
        };
        discard_path(&archive);
        placed
    }

    /// Staged archive whose checksum, when the registry publishes one,
    /// has been checked.
    fn fetch_release(&self, release: &RegistryRelease) -> Result<PathBuf, PackError> {
        let archive = self
            .services
            .fetcher
            .download(&release.download_url, &self.layout().staging_dir())
            .map_err(|err| {
                PackError::upstream(format!("failed downloading {}", release.download_url), err)
            })?;
        let Some(expected) = &release.sha256 else {
            return Ok(archive);
        };

        let verified = match verify_sha256_file(&archive, expected) {
            Ok(true) => Ok(archive.clone()),
            Ok(false) => Err(PackError::upstream(
                format!("checksum mismatch for {}", release.download_url),
                anyhow!("expected sha256 {expected}"),
            )),
            Err(err) => Err(PackError::io("failed verifying archive checksum", err)),
        };
        if verified.is_err() {
            discard_path(&archive);
        }
        verified
    }

    /// Unpacks into `destination` and removes files the previous release
    /// shipped and this one does not.
    fn unpack_release(
        &self,
        destination: &Path,
        package: &RegistryPackage,
        release: &RegistryRelease,
        archive: &Path,
        outcome: &mut Outcome,
    ) -> Result<(), PackError> {
        let previous = read_tracking_manifest(destination)
            .map_err(|err| PackError::io("failed reading previous tracking manifest", err))?;
        let fresh = !destination.exists();
        fs::create_dir_all(destination).map_err(|err| {
            PackError::io(format!("failed creating {}", destination.display()), err)
        })?;

        let extracted = match self.services.fetcher.extract(archive, destination) {
            Ok(extracted) => extracted,
            Err(err) => {
                if fresh {
                    discard_path(destination);
                }
                return Err(PackError::upstream(
                    format!("failed extracting {}", archive.display()),
                    err,
                ));
            }
        };

        if let Some(previous) = previous {
            let plan = collect_garbage(destination, &previous, &extracted)
                .map_err(|err| PackError::io("failed removing stale release files", err))?;
            outcome.collected.extend(plan.files);
            outcome.collected.extend(plan.directories);
        }
        write_tracking_manifest(destination, &extracted)
            .map_err(|err| PackError::io("failed writing tracking manifest", err))?;

        let declared = read_release_metadata(destination).ok().flatten();
        if declared.as_ref().map(|m| &m.version) != Some(&release.version) {
            write_release_metadata(
                destination,
                &ReleaseMetadata {
                    name: declared
                        .map(|metadata| metadata.name)
                        .unwrap_or_else(|| package.name.clone()),
                    version: release.version.clone(),
                    repository: package.repository.clone(),
                },
            )
            .map_err(|err| PackError::io("failed writing release metadata", err))?;
        }

        info!(
            id = %package.id,
            version = %release.version,
            path = %destination.display(),
            files = extracted.len(),
            "unpacked release"
        );
        Ok(())
    }
}

fn commit_of(spec: Option<&VersionSpec>) -> Option<&str> {
    match spec {
        Some(VersionSpec::Commit(hash)) => Some(hash.as_str()),
        _ => None,
    }
}
