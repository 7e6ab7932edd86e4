use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

/// Renames `from` to `to`, creating the parent of `to` first. When the
/// rename fails (another filesystem, an existing target) the tree is copied
/// and the original deleted.
pub(crate) fn relocate_dir(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot prepare {} for a pack directory", parent.display()))?;
    }
    if let Err(rename_err) = fs::rename(from, to) {
        debug!(
            from = %from.display(),
            to = %to.display(),
            error = %rename_err,
            "rename failed, copying pack directory"
        );
        copy_tree(from, to)?;
        fs::remove_dir_all(from).with_context(|| {
            format!("copied {} but could not remove the original", from.display())
        })?;
    }
    Ok(())
}

/// Copies everything under `from` into `to`. Symlinks are recreated, not
/// followed.
pub(crate) fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((source_dir, target_dir)) = pending.pop() {
        fs::create_dir_all(&target_dir)
            .with_context(|| format!("cannot create {}", target_dir.display()))?;
        let listing = fs::read_dir(&source_dir)
            .with_context(|| format!("cannot list {}", source_dir.display()))?;
        for entry in listing {
            let entry = entry.with_context(|| format!("cannot list {}", source_dir.display()))?;
            let source = entry.path();
            let target = target_dir.join(entry.file_name());
            let file_type = entry
                .file_type()
                .with_context(|| format!("cannot stat {}", source.display()))?;
            if file_type.is_dir() {
                pending.push((source, target));
            } else if file_type.is_symlink() {
                copy_symlink(&source, &target)?;
            } else {
                fs::copy(&source, &target).with_context(|| {
                    format!("cannot copy {} into {}", source.display(), target_dir.display())
                })?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    let link = fs::read_link(source)
        .with_context(|| format!("cannot read link {}", source.display()))?;
    remove_path_if_exists(target)?;
    std::os::unix::fs::symlink(&link, target)
        .with_context(|| format!("cannot link {} to {}", target.display(), link.display()))
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target)
        .map(|_| ())
        .with_context(|| format!("cannot copy {}", source.display()))
}

/// Removes a file, symlink or directory tree. Missing paths are fine.
pub(crate) fn remove_path_if_exists(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove directory {}", path.display()))
    } else {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
    }
}

/// Removes a leftover (staged archive, partial clone). A failure is only
/// logged since the operation it belongs to has already succeeded or failed.
pub(crate) fn discard_path(path: &Path) {
    if let Err(err) = remove_path_if_exists(path) {
        warn!(path = %path.display(), error = %format!("{err:#}"), "failed removing leftover");
    }
}

/// Relative paths of every file and directory under `root`, `/`-separated.
pub(crate) fn collect_relative_paths(root: &Path) -> Result<BTreeSet<String>> {
    let mut paths = BTreeSet::new();
    let mut queue = VecDeque::from([PathBuf::new()]);
    while let Some(relative) = queue.pop_front() {
        let dir = root.join(&relative);
        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry = entry?;
            let child = relative.join(entry.file_name());
            let rendered = child
                .components()
                .map(|component| component.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type()?.is_dir() {
                queue.push_back(child);
            }
            paths.insert(rendered);
        }
    }
    Ok(paths)
}

pub(crate) fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{}-{}", std::process::id(), nanos)
}

/// Runs `command` to completion. A non-zero exit becomes an error carrying
/// its stderr, or its stdout when stderr is empty.
pub(crate) fn run_command(command: &mut Command, what: &str) -> Result<()> {
    let program = command.get_program().to_string_lossy().to_string();
    let output = command
        .output()
        .with_context(|| format!("{what}: could not start {program}"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    Err(anyhow!("{what}: {program} exited with {} ({detail})", output.status))
}
