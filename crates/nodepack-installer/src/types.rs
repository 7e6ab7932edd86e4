use std::fmt;
use std::path::PathBuf;

use nodepack_core::VersionKind;

use crate::recovery::DeferredAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enable,
    Disable,
    Install,
    Uninstall,
    Update,
    Switch,
    Fix,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Update => "update",
            Self::Switch => "switch",
            Self::Fix => "fix",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyEnabled,
    AlreadyDisabled,
    AlreadyInstalled,
    NotInstalled,
    UpToDate,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyEnabled => "already-enabled",
            Self::AlreadyDisabled => "already-disabled",
            Self::AlreadyInstalled => "already-installed",
            Self::NotInstalled => "not-installed",
            Self::UpToDate => "up-to-date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Applied,
    Skipped(SkipReason),
    /// Some filesystem action could not finish and waits in the recovery log.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirMove {
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInstallReport {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    pub id: String,
    pub status: OutcomeStatus,
    pub version: Option<VersionKind>,
    pub path: Option<PathBuf>,
    pub moves: Vec<DirMove>,
    pub removed: Vec<PathBuf>,
    pub collected: Vec<String>,
    pub deferred: Vec<DeferredAction>,
    pub post_install: Option<PostInstallReport>,
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn new(action: Action, id: &str) -> Self {
        Self {
            action,
            id: id.to_string(),
            status: OutcomeStatus::Applied,
            version: None,
            path: None,
            moves: Vec::new(),
            removed: Vec::new(),
            collected: Vec::new(),
            deferred: Vec::new(),
            post_install: None,
            warnings: Vec::new(),
        }
    }

    pub fn skipped(action: Action, id: &str, reason: SkipReason) -> Self {
        Self {
            status: OutcomeStatus::Skipped(reason),
            ..Self::new(action, id)
        }
    }

    pub fn with_instance(mut self, version: &VersionKind, path: &std::path::Path) -> Self {
        self.version = Some(version.clone());
        self.path = Some(path.to_path_buf());
        self
    }

    pub fn is_applied(&self) -> bool {
        self.status == OutcomeStatus::Applied
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.status {
            OutcomeStatus::Skipped(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.status == OutcomeStatus::Deferred
    }
}

/// One logical pack as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSummary {
    pub id: String,
    pub version: VersionKind,
    pub active: bool,
    pub path: PathBuf,
    pub variants: usize,
}
