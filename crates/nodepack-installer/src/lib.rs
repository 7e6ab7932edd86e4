mod archive;
mod classify;
mod config;
mod fs_utils;
mod index;
mod install;
mod layout;
mod manager;
mod post_install;
mod recovery;
mod transitions;
mod types;
mod vcs;

pub use archive::{ArchiveFetcher, HttpArchiveFetcher};
pub use classify::{classify, Slot};
pub use config::{ManagerConfig, PostInstallConfig, CONFIG_FILE_NAME};
pub use index::PackIndex;
pub use layout::{
    inactive_stem, is_reserved_dir_name, parse_inactive_dir_name, PackLayout, DISABLED_DIR_NAME,
    LEGACY_DISABLED_SUFFIX,
};
pub use manager::{Collaborators, PackManager};
pub use post_install::{NoopPostInstall, PostInstall, PythonPostInstall};
pub use recovery::{DeferredAction, RecoveryLog, RecoveryReport, RetryPolicy};
pub use types::{
    Action, DirMove, Outcome, OutcomeStatus, PackSummary, PostInstallReport, SkipReason,
};
pub use vcs::{GitCli, UpdateStatus, Vcs, VcsError};

#[cfg(test)]
mod test_support;
