use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::fs_utils::{relocate_dir, remove_path_if_exists};

/// Bounded retry for filesystem actions that can fail transiently, such as
/// deleting a directory another process still has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay_ms: 0,
        }
    }

    pub fn run<T>(&self, what: &str, mut action: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match action() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, error = %format!("{err:#}"), "{what} failed, retrying");
                    if self.delay_ms > 0 {
                        thread::sleep(Duration::from_millis(self.delay_ms));
                    }
                    attempt += 1;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("{what} failed after {attempts} attempt(s)"))
                }
            }
        }
    }
}

/// Filesystem action postponed to the next process start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeferredAction {
    Delete { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl DeferredAction {
    pub fn execute(&self) -> Result<()> {
        match self {
            Self::Delete { path } => remove_path_if_exists(path),
            Self::Move { from, to } => {
                if !from.exists() {
                    return Ok(());
                }
                remove_path_if_exists(to)?;
                relocate_dir(from, to)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Delete { path } => format!("delete {}", path.display()),
            Self::Move { from, to } => format!("move {} -> {}", from.display(), to.display()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub completed: Vec<DeferredAction>,
    pub remaining: Vec<DeferredAction>,
}

/// Append-only JSON-lines log of deferred actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryLog {
    path: PathBuf,
}

impl RecoveryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, action: &DeferredAction) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let line = serde_json::to_string(action).context("failed to encode deferred action")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open recovery log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.flush())
            .with_context(|| format!("failed to append recovery log: {}", self.path.display()))?;
        Ok(())
    }

    pub fn pending(&self) -> Result<Vec<DeferredAction>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read recovery log: {}", self.path.display())
                })
            }
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!(
                        "invalid recovery log entry at {}:{}",
                        self.path.display(),
                        index + 1
                    )
                })
            })
            .collect()
    }

    /// Runs every pending action once and keeps the ones that still fail.
    pub fn run_pending(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for action in self.pending()? {
            match action.execute() {
                Ok(()) => {
                    info!(action = %action.describe(), "completed deferred action");
                    report.completed.push(action);
                }
                Err(err) => {
                    warn!(action = %action.describe(), error = %format!("{err:#}"), "deferred action still failing");
                    report.remaining.push(action);
                }
            }
        }
        self.rewrite(&report.remaining)?;
        Ok(report)
    }

    fn rewrite(&self, actions: &[DeferredAction]) -> Result<()> {
        if actions.is_empty() {
            return remove_path_if_exists(&self.path);
        }
        let mut content = String::new();
        for action in actions {
            content.push_str(
                &serde_json::to_string(action).context("failed to encode deferred action")?,
            );
            content.push('\n');
        }
        fs::write(&self.path, content)
            .with_context(|| format!("failed to rewrite recovery log: {}", self.path.display()))
    }
}
