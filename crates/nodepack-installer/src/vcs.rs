use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VcsError {
    #[error("repository at {} is on a detached HEAD", path.display())]
    DetachedHead { path: PathBuf },
    #[error("repository at {} has no remote", path.display())]
    MissingRemote { path: PathBuf },
    #[error("git refuses repository at {} owned by another user", path.display())]
    DubiousOwnership { path: PathBuf },
    #[error("branch '{branch}' in {} cannot be fast-forwarded", path.display())]
    NotUpdatable { path: PathBuf, branch: String },
    #[error("{context}: {message}")]
    Command { context: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Updated,
    UpToDate,
}

/// Version control operations the lifecycle engine needs for nightly packs.
pub trait Vcs {
    fn is_work_tree(&self, path: &Path) -> bool;
    fn clone_repo(&self, url: &str, destination: &Path) -> Result<(), VcsError>;
    /// Fetches and fast-forwards the checked-out branch.
    fn update(&self, path: &Path) -> Result<UpdateStatus, VcsError>;
    fn current_commit(&self, path: &Path) -> Result<String, VcsError>;
    fn remote_url(&self, path: &Path) -> Result<Option<String>, VcsError>;
    fn checkout(&self, path: &Path, commit: &str) -> Result<(), VcsError>;
    fn checkout_default_branch(&self, path: &Path) -> Result<(), VcsError>;
    fn trust_directory(&self, path: &Path) -> Result<(), VcsError>;
}

/// `Vcs` backed by the `git` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

fn base_git_command() -> Command {
    let mut command = Command::new("git");
    command
        .arg("-c")
        .arg("core.autocrlf=false")
        .arg("-c")
        .arg("core.eol=lf");
    if cfg!(windows) {
        command.arg("-c").arg("core.longpaths=true");
    }
    command
}

fn run_git(repo_root: Option<&Path>, args: &[&str]) -> Result<String, VcsError> {
    let mut command = base_git_command();
    command.args(args);
    if let Some(repo_root) = repo_root {
        command.current_dir(repo_root);
    }
    let context = format!("git {}", args.join(" "));
    let output = command.output().map_err(|err| VcsError::Command {
        context: context.clone(),
        message: format!("failed launching git: {err}"),
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        if stderr.contains("detected dubious ownership") {
            return Err(VcsError::DubiousOwnership {
                path: repo_root.map(Path::to_path_buf).unwrap_or_default(),
            });
        }
        return Err(VcsError::Command {
            context,
            message: stderr,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

impl GitCli {
    /// `origin`, else `upstream`, else the first configured remote.
    fn remote_name(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let listing = run_git(Some(path), &["remote"])?;
        let remotes = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        for preferred in ["origin", "upstream"] {
            if remotes.contains(&preferred) {
                return Ok(Some(preferred.to_string()));
            }
        }
        Ok(remotes.first().map(|remote| remote.to_string()))
    }

    fn require_remote(&self, path: &Path) -> Result<String, VcsError> {
        self.remote_name(path)?.ok_or_else(|| VcsError::MissingRemote {
            path: path.to_path_buf(),
        })
    }

    fn ref_exists(&self, path: &Path, reference: &str) -> bool {
        run_git(Some(path), &["rev-parse", "--verify", "--quiet", reference]).is_ok()
    }
}

impl Vcs for GitCli {
    fn is_work_tree(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    fn clone_repo(&self, url: &str, destination: &Path) -> Result<(), VcsError> {
        let destination_arg = destination.to_string_lossy();
        info!(url, destination = %destination.display(), "cloning repository");
        run_git(
            None,
            &["clone", "--recursive", "--", url, destination_arg.as_ref()],
        )?;
        Ok(())
    }

    fn update(&self, path: &Path) -> Result<UpdateStatus, VcsError> {
        let branch = run_git(Some(path), &["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch == "HEAD" {
            return Err(VcsError::DetachedHead {
                path: path.to_path_buf(),
            });
        }
        let remote = self.require_remote(path)?;
        let before = self.current_commit(path)?;

        run_git(Some(path), &["fetch", remote.as_str()])?;
        let tracking = format!("{remote}/{branch}");
        if !self.ref_exists(path, &tracking) {
            return Err(VcsError::NotUpdatable {
                path: path.to_path_buf(),
                branch,
            });
        }
        let remote_head = run_git(Some(path), &["rev-parse", tracking.as_str()])?;
        if remote_head == before {
            return Ok(UpdateStatus::UpToDate);
        }

        if !run_git(Some(path), &["status", "--porcelain"])?.is_empty() {
            debug!(path = %path.display(), "stashing local changes before update");
            run_git(Some(path), &["stash"])?;
        }
        run_git(Some(path), &["merge", "--ff-only", tracking.as_str()]).map_err(|_| {
            VcsError::NotUpdatable {
                path: path.to_path_buf(),
                branch: branch.clone(),
            }
        })?;
        run_git(Some(path), &["submodule", "update", "--init", "--recursive"])?;

        if self.current_commit(path)? == before {
            Ok(UpdateStatus::UpToDate)
        } else {
            Ok(UpdateStatus::Updated)
        }
    }

    fn current_commit(&self, path: &Path) -> Result<String, VcsError> {
        let commit = run_git(Some(path), &["rev-parse", "HEAD"])?;
        if commit.len() < 7 || !commit.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(VcsError::Command {
                context: "git rev-parse HEAD".to_string(),
                message: format!("unexpected commit id '{commit}'"),
            });
        }
        Ok(commit)
    }

    fn remote_url(&self, path: &Path) -> Result<Option<String>, VcsError> {
        let Some(remote) = self.remote_name(path)? else {
            return Ok(None);
        };
        let url = run_git(Some(path), &["remote", "get-url", remote.as_str()])?;
        Ok(Some(url).filter(|url| !url.is_empty()))
    }

    fn checkout(&self, path: &Path, commit: &str) -> Result<(), VcsError> {
        run_git(Some(path), &["checkout", commit])?;
        Ok(())
    }

    fn checkout_default_branch(&self, path: &Path) -> Result<(), VcsError> {
        let remote = self.require_remote(path)?;
        let head_ref = format!("refs/remotes/{remote}/HEAD");
        if let Ok(symbolic) = run_git(Some(path), &["symbolic-ref", head_ref.as_str()]) {
            let prefix = format!("refs/remotes/{remote}/");
            let branch = symbolic.strip_prefix(&prefix).unwrap_or(&symbolic);
            if run_git(Some(path), &["checkout", branch]).is_ok() {
                return Ok(());
            }
        }

        for branch in ["master", "main"] {
            if run_git(Some(path), &["checkout", branch]).is_ok() {
                return Ok(());
            }
            let tracking = format!("{remote}/{branch}");
            if self.ref_exists(path, &tracking)
                && run_git(Some(path), &["checkout", "-b", branch, tracking.as_str()]).is_ok()
            {
                return Ok(());
            }
        }
        Err(VcsError::DetachedHead {
            path: path.to_path_buf(),
        })
    }

    fn trust_directory(&self, path: &Path) -> Result<(), VcsError> {
        let safe_dir = path.to_string_lossy().replace('\\', "/");
        info!(path = %safe_dir, "adding repository to git safe.directory");
        run_git(
            None,
            &["config", "--global", "--add", "safe.directory", safe_dir.as_str()],
        )?;
        Ok(())
    }
}
