use nodepack_core::{read_release_metadata, PackError, PackInstance, VersionKind, VersionSpec};
use nodepack_resolver::{highest_release, select_active, select_inactive};
use tracing::{info, warn};

use crate::manager::PackManager;
use crate::types::{Action, Outcome, SkipReason};

impl PackManager<'_> {
    /// Moves a disabled instance into the active slot. `None` picks the
    /// highest disabled release, else nightly, else unknown.
    pub fn enable(&mut self, id: &str, spec: Option<&VersionSpec>) -> Result<Outcome, PackError> {
        self.settled(|manager| manager.enable_pack(id, spec))
    }

    /// Moves the active instance into the inactive subtree.
    pub fn disable(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.ensure_not_protected(id)?;
        self.settled(|manager| manager.disable_pack(id))
    }

    /// Deletes every instance of the pack, active and inactive.
    pub fn uninstall(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.ensure_not_protected(id)?;
        self.settled(|manager| manager.uninstall_pack(id))
    }

    fn enable_pack(&mut self, id: &str, spec: Option<&VersionSpec>) -> Result<Outcome, PackError> {
        self.rebuild()?;
        let instances = self.instances_for(id);
        if instances.is_empty() {
            return Err(PackError::not_found(format!("'{id}' is not installed")));
        }

        let wanted = match spec {
            Some(VersionSpec::Latest) => {
                highest_release(instances.iter().filter(|instance| !instance.active))
                    .map(|instance| instance.version.clone())
            }
            Some(spec) => spec.as_kind(),
            None => None,
        };

        if let Some(active) = select_active(&instances) {
            let satisfied = match &wanted {
                Some(wanted) => &active.version == wanted,
                None => true,
            };
            if satisfied {
                return Ok(Outcome::skipped(Action::Enable, id, SkipReason::AlreadyEnabled)
                    .with_instance(&active.version, &active.path));
            }
        }

        let Some(target) = select_inactive(&instances, wanted.as_ref()).cloned() else {
            let described = wanted
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "any version".to_string());
            return Err(PackError::not_found(format!(
                "no disabled instance of '{id}' matches {described}"
            )));
        };
        if let Some(active) = select_active(&instances) {
            return Err(PackError::conflict(format!(
                "'{id}' {} is enabled; disable it before enabling {}",
                active.version, target.version
            )));
        }

        let mut outcome = Outcome::new(Action::Enable, id);
        if self.enable_instance(&target, &mut outcome)? {
            info!(id, version = %target.version, "enabled pack");
        }
        Ok(outcome)
    }

    fn disable_pack(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.rebuild()?;
        let instances = self.instances_for(id);
        if instances.is_empty() {
            return Err(PackError::not_found(format!("'{id}' is not installed")));
        }
        let Some(active) = select_active(&instances).cloned() else {
            return Ok(Outcome::skipped(Action::Disable, id, SkipReason::AlreadyDisabled));
        };

        let mut outcome = Outcome::new(Action::Disable, id);
        if self.disable_instance(&active, &mut outcome)? {
            info!(id, version = %active.version, "disabled pack");
        }
        Ok(outcome)
    }

    fn uninstall_pack(&mut self, id: &str) -> Result<Outcome, PackError> {
        self.rebuild()?;
        let instances = self.instances_for(id);
        if instances.is_empty() {
            return Ok(Outcome::skipped(Action::Uninstall, id, SkipReason::NotInstalled));
        }

        let mut outcome = Outcome::new(Action::Uninstall, id);
        for instance in &instances {
            self.remove_pack_dir(&instance.path, &mut outcome)?;
        }
        info!(
            id,
            removed = outcome.removed.len(),
            deferred = outcome.deferred.len(),
            "uninstalled pack"
        );
        Ok(outcome)
    }

    /// Returns `false` when the move was deferred.
    pub(crate) fn enable_instance(
        &self,
        target: &PackInstance,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let destination = self.enable_destination(target);
        if destination.exists() {
            return Err(PackError::conflict(format!(
                "cannot enable '{}': {} already exists",
                target.id,
                destination.display()
            )));
        }
        let moved = self.move_pack(&target.path, &destination, outcome)?;
        outcome.version = Some(target.version.clone());
        outcome.path = Some(destination);
        Ok(moved)
    }

    /// Returns `false` when the move was deferred.
    pub(crate) fn disable_instance(
        &self,
        active: &PackInstance,
        outcome: &mut Outcome,
    ) -> Result<bool, PackError> {
        let version = self.version_on_disk(active, outcome);
        let destination = self.layout().inactive_path(&active.id, &version);
        if destination.exists() && !self.remove_pack_dir(&destination, outcome)? {
            return Ok(false);
        }
        self.move_pack(&active.path, &destination, outcome)
    }

    /// Version as recorded in the directory right now; the scan result is
    /// only a fallback.
    fn version_on_disk(&self, instance: &PackInstance, outcome: &mut Outcome) -> VersionKind {
        if self.services.vcs.is_work_tree(&instance.path) {
            return VersionKind::Nightly;
        }
        if !instance.is_release() {
            return instance.version.clone();
        }
        match read_release_metadata(&instance.path) {
            Ok(Some(metadata)) => VersionKind::Release(metadata.version),
            Ok(None) => {
                let warning = format!(
                    "release metadata missing in {}; using scanned version {}",
                    instance.path.display(),
                    instance.version
                );
                warn!("{warning}");
                outcome.warnings.push(warning);
                instance.version.clone()
            }
            Err(err) => {
                let warning = format!(
                    "failed reading release metadata in {} ({err:#}); using scanned version {}",
                    instance.path.display(),
                    instance.version
                );
                warn!("{warning}");
                outcome.warnings.push(warning);
                instance.version.clone()
            }
        }
    }
}
