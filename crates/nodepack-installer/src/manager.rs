use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nodepack_core::{
    normalize_id, repository_name, PackError, PackInstance, VersionKind, VersionSpec,
};
use nodepack_registry::{Registry, RegistryPackage};
use nodepack_resolver::{
    resolve_version, select_active, select_inactive, select_preferred, PackRequest, ResolveScope,
};
use semver::Version;
use tracing::{info, warn};

use crate::archive::ArchiveFetcher;
use crate::config::ManagerConfig;
use crate::fs_utils::{relocate_dir, remove_path_if_exists};
use crate::index::PackIndex;
use crate::layout::PackLayout;
use crate::post_install::PostInstall;
use crate::recovery::{DeferredAction, RecoveryLog, RecoveryReport};
use crate::types::{DirMove, Outcome, OutcomeStatus, PackSummary, PostInstallReport};
use crate::vcs::Vcs;

/// External services the engine drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub registry: &'a dyn Registry,
    pub vcs: &'a dyn Vcs,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub post_install: &'a dyn PostInstall,
}

/// Lifecycle engine for one pack root. Every mutating operation rescans the
/// root first and again when it is done.
pub struct PackManager<'a> {
    config: ManagerConfig,
    layout: PackLayout,
    recovery: RecoveryLog,
    index: PackIndex,
    pub(crate) services: Collaborators<'a>,
}

impl<'a> PackManager<'a> {
    pub fn new(config: ManagerConfig, services: Collaborators<'a>) -> Result<Self, PackError> {
        let layout = config.layout();
        layout
            .ensure_base_dirs()
            .map_err(|err| PackError::io("failed preparing pack root", err))?;
        let recovery = RecoveryLog::new(config.recovery_log_path());
        let mut manager = Self {
            config,
            layout,
            recovery,
            index: PackIndex::default(),
            services,
        };
        manager.rebuild()?;
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn layout(&self) -> &PackLayout {
        &self.layout
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn recovery_log(&self) -> &RecoveryLog {
        &self.recovery
    }

    pub fn rebuild(&mut self) -> Result<(), PackError> {
        self.index = PackIndex::scan(&self.layout, self.services.vcs, self.services.registry)
            .map_err(|err| PackError::io("failed scanning pack root", err))?;
        Ok(())
    }

    /// Runs actions deferred by earlier processes.
    pub fn run_recovery(&mut self) -> Result<RecoveryReport, PackError> {
        let report = self
            .recovery
            .run_pending()
            .map_err(|err| PackError::io("failed running pending recovery", err))?;
        if !report.completed.is_empty() {
            self.rebuild()?;
        }
        Ok(report)
    }

    pub fn instances_for(&self, id: &str) -> Vec<PackInstance> {
        self.index.instances_for(id, self.services.registry)
    }

    pub fn active_instance(&self, id: &str) -> Option<PackInstance> {
        select_active(&self.instances_for(id)).cloned()
    }

    pub fn inactive_instance(&self, id: &str, spec: Option<&VersionSpec>) -> Option<PackInstance> {
        let instances = self.instances_for(id);
        let wanted = match spec {
            Some(VersionSpec::Latest) => {
                return nodepack_resolver::highest_release(
                    instances.iter().filter(|instance| !instance.active),
                )
                .cloned()
            }
            Some(spec) => spec.as_kind(),
            None => None,
        };
        select_inactive(&instances, wanted.as_ref()).cloned()
    }

    pub fn is_enabled(&self, id: &str, version: Option<&VersionKind>) -> bool {
        self.active_instance(id)
            .map(|active| version.map_or(true, |wanted| &active.version == wanted))
            .unwrap_or(false)
    }

    pub fn is_disabled(&self, id: &str, version: Option<&VersionKind>) -> bool {
        self.instances_for(id).iter().any(|instance| {
            !instance.active && version.map_or(true, |wanted| &instance.version == wanted)
        })
    }

    pub fn resolve(
        &self,
        request: &PackRequest,
        scope: ResolveScope,
    ) -> Result<VersionKind, PackError> {
        let instances = self.instances_for(&request.id);
        let registry_latest = match (&request.spec, scope) {
            (Some(VersionSpec::Latest), _) => self.registry_latest(&request.id)?,
            (None, ResolveScope::Global) => self.registry_latest_lenient(&request.id),
            _ => None,
        };
        resolve_version(
            &request.id,
            &instances,
            request.spec.as_ref(),
            scope,
            registry_latest.as_ref(),
        )
    }

    /// One entry per logical pack; release and nightly variants of the same
    /// repository are grouped together.
    pub fn installed_packs(&self) -> Vec<PackSummary> {
        let mut groups: BTreeMap<String, Vec<PackInstance>> = BTreeMap::new();
        let mut repo_groups: BTreeMap<String, String> = BTreeMap::new();
        for instance in self.index.instances() {
            let id_key = normalize_id(&instance.id);
            let key = match instance.compact_repo_url().map(|c| normalize_id(&c)) {
                Some(repo_key) => repo_groups
                    .entry(repo_key)
                    .or_insert_with(|| id_key.clone())
                    .clone(),
                None => id_key,
            };
            groups.entry(key).or_default().push(instance.clone());
        }

        let mut summaries = groups
            .values()
            .filter_map(|instances| {
                select_preferred(instances).map(|preferred| PackSummary {
                    id: preferred.id.clone(),
                    version: preferred.version.clone(),
                    active: preferred.active,
                    path: preferred.path.clone(),
                    variants: instances.len(),
                })
            })
            .collect::<Vec<_>>();
        summaries.sort_by_key(|summary| normalize_id(&summary.id));
        summaries
    }

    pub(crate) fn registry_package(&self, id: &str) -> Result<Option<RegistryPackage>, PackError> {
        self.services
            .registry
            .lookup(id)
            .map_err(|err| PackError::upstream(format!("registry lookup for '{id}' failed"), err))
    }

    pub(crate) fn registry_latest(&self, id: &str) -> Result<Option<Version>, PackError> {
        Ok(self
            .registry_package(id)?
            .and_then(|package| package.latest_version().cloned()))
    }

    fn registry_latest_lenient(&self, id: &str) -> Option<Version> {
        match self.registry_latest(id) {
            Ok(latest) => latest,
            Err(err) => {
                warn!(id, error = %err, "registry unavailable, resolving from local instances");
                None
            }
        }
    }

    pub(crate) fn ensure_not_protected(&self, id: &str) -> Result<(), PackError> {
        if self.config.is_protected(id) {
            return Err(PackError::conflict(format!("'{id}' is protected")));
        }
        Ok(())
    }

    /// Active directory name for an instance being enabled.
    pub(crate) fn enable_destination(&self, instance: &PackInstance) -> PathBuf {
        let name = instance
            .original_name
            .clone()
            .or_else(|| instance.repo_url.as_deref().map(repository_name))
            .unwrap_or_else(|| {
                if instance.id.contains('/') {
                    repository_name(&instance.id)
                } else {
                    instance.id.clone()
                }
            });
        self.layout.active_path(&name)
    }

    /// Moves a pack directory with retries. Returns `false` when the move was
    /// deferred to the recovery log.
    pub(crate) fn move_pack(
        &self,
        from: &Path,
        to: &Path,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let attempt = self.config.retry.run(
            &format!("moving {} to {}", from.display(), to.display()),
            || relocate_dir(from, to),
        );
        match attempt {
            Ok(()) => {
                info!(from = %from.display(), to = %to.display(), "moved pack directory");
                outcome.moves.push(DirMove {
                    from: from.to_path_buf(),
                    to: to.to_path_buf(),
                });
                Ok(true)
            }
            Err(err) => {
                self.defer(
                    DeferredAction::Move {
                        from: from.to_path_buf(),
                        to: to.to_path_buf(),
                    },
                    err,
                    outcome,
                )?;
                Ok(false)
            }
        }
    }

    /// Deletes a pack directory with retries. Returns `false` when the delete
    /// was deferred to the recovery log.
    pub(crate) fn remove_pack_dir(
        &self,
        path: &Path,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let attempt = self
            .config
            .retry
            .run(&format!("removing {}", path.display()), || {
                remove_path_if_exists(path)
            });
        match attempt {
            Ok(()) => {
                info!(path = %path.display(), "removed pack directory");
                outcome.removed.push(path.to_path_buf());
                Ok(true)
            }
            Err(err) => {
                self.defer(
                    DeferredAction::Delete {
                        path: path.to_path_buf(),
                    },
                    err,
                    outcome,
                )?;
                Ok(false)
            }
        }
    }

    fn defer(
        &self,
        action: DeferredAction,
        cause: anyhow::Error,
        outcome: &mut Outcome,
    ) -> Result<(), PackError> {
        warn!(action = %action.describe(), error = %format!("{cause:#}"), "deferring action to next start");
        self.recovery.append(&action).map_err(|err| {
            PackError::io(
                format!(
                    "failed to record deferred action '{}' ({cause:#})",
                    action.describe()
                ),
                err,
            )
        })?;
        outcome.deferred.push(action);
        outcome.status = OutcomeStatus::Deferred;
        Ok(())
    }

    pub(crate) fn run_post_install(&self, path: &Path, outcome: &mut Outcome) {
        let report = match self.services.post_install.run(path) {
            Ok(()) => PostInstallReport::Succeeded,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(path = %path.display(), error = %message, "post-install failed");
                PostInstallReport::Failed(message)
            }
        };
        outcome.post_install = Some(report);
    }

    /// Runs one mutating operation, then rescans whether it succeeded or
    /// not. A failure may already have moved directories.
    pub(crate) fn settled(
        &mut self,
        operation: impl FnOnce(&mut Self) -> Result<Outcome, PackError>,
    ) -> Result<Outcome, PackError> {
        let result = operation(self);
        let rescanned = self.rebuild();
        match result {
            Ok(outcome) => rescanned.map(|()| outcome),
            Err(err) => {
                if let Err(rescan) = rescanned {
                    warn!(error = %rescan, "failed rescanning after failed operation");
                }
                Err(err)
            }
        }
    }
}
