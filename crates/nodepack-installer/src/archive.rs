use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::fs_utils::{
    collect_relative_paths, copy_tree, discard_path, run_command, unique_suffix,
};

/// Fetches and unpacks release archives.
pub trait ArchiveFetcher {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
    /// Unpacks into `dest_dir`, overwriting existing files, and returns the
    /// relative paths of every file and directory the archive produced.
    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<BTreeSet<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    Tar,
}

impl ArchiveFormat {
    fn infer(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".tar")
            || name.ends_with(".tar.gz")
            || name.ends_with(".tgz")
            || name.ends_with(".tar.zst")
        {
            Self::Tar
        } else {
            Self::Zip
        }
    }
}

/// Downloads over HTTPS and unpacks with the platform `unzip`/`tar` tools.
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    client: reqwest::blocking::Client,
    show_progress: bool,
}

impl HttpArchiveFetcher {
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("nodepack/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, total: Option<u64>, label: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = match total {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} {msg:<24} [{bar:20.cyan/blue}] {bytes:>9}/{total_bytes:9}",
        ) {
            progress_bar.set_style(style.progress_chars("=> "));
        }
        progress_bar.set_message(label.to_string());
        progress_bar
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        let file_name = archive_file_name(url);
        let destination = dest_dir.join(&file_name);
        let part = dest_dir.join(format!("{file_name}.part"));

        debug!(url, destination = %destination.display(), "downloading archive");
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("failed to request {url}"))?
            .error_for_status()
            .with_context(|| format!("download failed for {url}"))?;
        let progress_bar = self.progress_bar(response.content_length(), &file_name);

        let mut file = File::create(&part)
            .with_context(|| format!("failed to create {}", part.display()))?;
        let mut reader = progress_bar.wrap_read(response);
        let copied = io::copy(&mut reader, &mut file);
        progress_bar.finish_and_clear();
        if let Err(err) = copied {
            discard_path(&part);
            return Err(err).with_context(|| format!("failed to write {}", part.display()));
        }
        drop(file);

        fs::rename(&part, &destination).with_context(|| {
            format!(
                "failed to move {} to {}",
                part.display(),
                destination.display()
            )
        })?;
        Ok(destination)
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<BTreeSet<String>> {
        let staging = archive.with_file_name(format!(".extract-{}", unique_suffix()));
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;

        let result = unpack(archive, &staging).and_then(|_| {
            let entries = collect_relative_paths(&staging)?;
            copy_tree(&staging, dest_dir)?;
            Ok(entries)
        });
        discard_path(&staging);
        result
    }
}

fn unpack(archive: &Path, dst: &Path) -> Result<()> {
    match ArchiveFormat::infer(archive) {
        ArchiveFormat::Tar => run_command(
            Command::new("tar").arg("-xf").arg(archive).arg("-C").arg(dst),
            "failed to extract tar archive",
        ),
        ArchiveFormat::Zip => {
            let mut unzip_command = Command::new("unzip");
            unzip_command.arg("-q").arg("-o").arg(archive).arg("-d").arg(dst);
            if run_command(&mut unzip_command, "failed to extract zip archive with unzip").is_ok()
            {
                return Ok(());
            }
            run_command(
                Command::new("tar").arg("-xf").arg(archive).arg("-C").arg(dst),
                "failed to extract zip archive with tar fallback",
            )
        }
    }
}

fn archive_file_name(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = without_query
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_'))
        .collect::<String>();
    if candidate.is_empty() || candidate.starts_with('.') {
        "pack.zip".to_string()
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_file_name_strips_query_and_unsafe_characters() {
        assert_eq!(
            archive_file_name("https://cdn.example.test/foo/1.0.2/node.zip?sig=abc"),
            "node.zip"
        );
        assert_eq!(archive_file_name("https://cdn.example.test/"), "pack.zip");
        assert_eq!(
            archive_file_name("https://cdn.example.test/a b$.tar.gz"),
            "ab.tar.gz"
        );
    }

    #[test]
    fn archive_format_is_inferred_from_extension() {
        assert_eq!(
            ArchiveFormat::infer(Path::new("/tmp/pack.tar.gz")),
            ArchiveFormat::Tar
        );
        assert_eq!(
            ArchiveFormat::infer(Path::new("/tmp/pack.ZIP")),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::infer(Path::new("/tmp/pack")),
            ArchiveFormat::Zip
        );
    }
}
