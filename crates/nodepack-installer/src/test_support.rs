use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, Context, Result};
use nodepack_core::{compact_url, normalize_id, ReleaseMetadata};
use nodepack_registry::{Registry, RegistryPackage, RegistryRelease};
use semver::Version;

use crate::archive::ArchiveFetcher;
use crate::config::ManagerConfig;
use crate::manager::{Collaborators, PackManager};
use crate::post_install::PostInstall;
use crate::recovery::RetryPolicy;
use crate::vcs::{UpdateStatus, Vcs, VcsError};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn test_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "nodepack-installer-{label}-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

pub(crate) fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent dir");
    }
    fs::write(path, content).expect("must write file");
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    packages: Vec<RegistryPackage>,
    pub(crate) offline: Cell<bool>,
}

impl FakeRegistry {
    /// Registers a pack whose releases download from `https://cdn.test/<id>/<version>.zip`.
    pub(crate) fn with_pack(mut self, id: &str, repository: Option<&str>, versions: &[&str]) -> Self {
        let mut releases = versions
            .iter()
            .map(|raw| {
                let version = Version::parse(raw).expect("must parse version");
                RegistryRelease {
                    download_url: release_url(id, &version),
                    version,
                    sha256: None,
                }
            })
            .collect::<Vec<_>>();
        releases.sort_by(|left, right| right.version.cmp(&left.version));
        self.packages.push(RegistryPackage {
            id: id.to_string(),
            name: id.to_string(),
            repository: repository.map(str::to_string),
            releases,
        });
        self
    }

    pub(crate) fn set_sha256(&mut self, id: &str, version: &str, sha256: &str) {
        let version = Version::parse(version).expect("must parse version");
        for package in &mut self.packages {
            if package.id == id {
                for release in &mut package.releases {
                    if release.version == version {
                        release.sha256 = Some(sha256.to_string());
                    }
                }
            }
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.get() {
            return Err(anyhow!("registry is offline"));
        }
        Ok(())
    }
}

impl Registry for FakeRegistry {
    fn lookup(&self, id: &str) -> Result<Option<RegistryPackage>> {
        self.check_online()?;
        let wanted = normalize_id(id);
        Ok(self
            .packages
            .iter()
            .find(|package| normalize_id(&package.id) == wanted)
            .cloned())
    }

    fn lookup_by_repository(&self, compact: &str) -> Result<Option<RegistryPackage>> {
        self.check_online()?;
        let wanted = normalize_id(&compact_url(compact));
        Ok(self
            .packages
            .iter()
            .find(|package| {
                package
                    .repository
                    .as_deref()
                    .map(|repository| normalize_id(&compact_url(repository)) == wanted)
                    .unwrap_or(false)
            })
            .cloned())
    }
}

pub(crate) fn release_url(id: &str, version: &Version) -> String {
    format!("https://cdn.test/{id}/{version}.zip")
}

/// Git stand-in keeping its state in marker files under `.git`:
/// `remote`, `HEAD`, `pending` (next commit an update brings in),
/// `detached` and `dubious`.
#[derive(Default)]
pub(crate) struct FakeVcs {
    /// Clone URL (normalized) to the commit a fresh clone lands on.
    remotes: BTreeMap<String, String>,
    pub(crate) calls: RefCell<Vec<String>>,
}

impl FakeVcs {
    pub(crate) fn with_remote(mut self, url: &str, head: &str) -> Self {
        self.remotes.insert(normalize_id(url), head.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

pub(crate) fn make_work_tree(path: &Path, remote: &str, head: &str) {
    write_file(&path.join(".git/remote"), remote);
    write_file(&path.join(".git/HEAD"), head);
    write_file(&path.join("__init__.py"), "");
}

fn marker(path: &Path, name: &str) -> PathBuf {
    path.join(".git").join(name)
}

fn command_error(context: &str, err: impl std::fmt::Display) -> VcsError {
    VcsError::Command {
        context: context.to_string(),
        message: err.to_string(),
    }
}

impl Vcs for FakeVcs {
    fn is_work_tree(&self, path: &Path) -> bool {
        path.join(".git").is_dir()
    }

    fn clone_repo(&self, url: &str, destination: &Path) -> Result<(), VcsError> {
        self.record(format!("clone {url}"));
        let Some(head) = self.remotes.get(&normalize_id(url)) else {
            return Err(command_error("git clone", format!("repository not found: {url}")));
        };
        make_work_tree(destination, url, head);
        Ok(())
    }

    fn update(&self, path: &Path) -> Result<UpdateStatus, VcsError> {
        self.record(format!("update {}", path.display()));
        if marker(path, "dubious").exists() {
            return Err(VcsError::DubiousOwnership {
                path: path.to_path_buf(),
            });
        }
        if marker(path, "detached").exists() {
            return Err(VcsError::DetachedHead {
                path: path.to_path_buf(),
            });
        }
        let pending = marker(path, "pending");
        match fs::read_to_string(&pending) {
            Ok(next) => {
                fs::write(marker(path, "HEAD"), next.trim())
                    .map_err(|err| command_error("git merge", err))?;
                fs::remove_file(&pending).map_err(|err| command_error("git merge", err))?;
                Ok(UpdateStatus::Updated)
            }
            Err(_) => Ok(UpdateStatus::UpToDate),
        }
    }

    fn current_commit(&self, path: &Path) -> Result<String, VcsError> {
        fs::read_to_string(marker(path, "HEAD"))
            .map(|head| head.trim().to_string())
            .map_err(|err| command_error("git rev-parse HEAD", err))
    }

    fn remote_url(&self, path: &Path) -> Result<Option<String>, VcsError> {
        match fs::read_to_string(marker(path, "remote")) {
            Ok(remote) => Ok(Some(remote.trim().to_string()).filter(|url| !url.is_empty())),
            Err(_) => Ok(None),
        }
    }

    fn checkout(&self, path: &Path, commit: &str) -> Result<(), VcsError> {
        self.record(format!("checkout {commit}"));
        fs::write(marker(path, "HEAD"), commit).map_err(|err| command_error("git checkout", err))
    }

    fn checkout_default_branch(&self, path: &Path) -> Result<(), VcsError> {
        self.record("checkout-default-branch".to_string());
        fs::remove_file(marker(path, "detached"))
            .map_err(|err| command_error("git checkout", err))
    }

    fn trust_directory(&self, path: &Path) -> Result<(), VcsError> {
        self.record("trust-directory".to_string());
        fs::remove_file(marker(path, "dubious")).map_err(|err| command_error("git config", err))
    }
}

/// Archive stand-in: a "download" writes the URL into a file, and
/// extracting it writes the file set registered for that URL.
#[derive(Default)]
pub(crate) struct FakeFetcher {
    archives: BTreeMap<String, BTreeMap<String, String>>,
    pub(crate) downloads: RefCell<Vec<String>>,
    pub(crate) fail_extract: Cell<bool>,
}

impl FakeFetcher {
    /// Registers a release archive holding `files` plus its `pyproject.toml`.
    pub(crate) fn with_release(
        mut self,
        id: &str,
        version: &str,
        repository: Option<&str>,
        files: &[&str],
    ) -> Self {
        let version = Version::parse(version).expect("must parse version");
        let metadata = ReleaseMetadata {
            name: id.to_string(),
            version: version.clone(),
            repository: repository.map(str::to_string),
        };
        let mut contents = files
            .iter()
            .map(|file| (file.to_string(), format!("{id} {version} {file}")))
            .collect::<BTreeMap<_, _>>();
        contents.insert(
            "pyproject.toml".to_string(),
            metadata.to_toml_string().expect("must render metadata"),
        );
        self.archives.insert(release_url(id, &version), contents);
        self
    }

    pub(crate) fn download_count(&self) -> usize {
        self.downloads.borrow().len()
    }
}

impl ArchiveFetcher for FakeFetcher {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        if !self.archives.contains_key(url) {
            return Err(anyhow!("404 for {url}"));
        }
        self.downloads.borrow_mut().push(url.to_string());
        fs::create_dir_all(dest_dir)?;
        let archive = dest_dir.join(format!("archive-{}.zip", self.download_count()));
        fs::write(&archive, url).with_context(|| format!("failed writing {}", archive.display()))?;
        Ok(archive)
    }

    fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<BTreeSet<String>> {
        if self.fail_extract.get() {
            return Err(anyhow!("truncated archive {}", archive.display()));
        }
        let url = fs::read_to_string(archive)?;
        let files = self
            .archives
            .get(url.trim())
            .ok_or_else(|| anyhow!("corrupt archive {}", archive.display()))?;
        let mut entries = BTreeSet::new();
        for (relative, content) in files {
            write_file(&dest_dir.join(relative), content);
            let mut parent = Path::new(relative).parent();
            while let Some(dir) = parent.filter(|dir| !dir.as_os_str().is_empty()) {
                entries.insert(dir.to_string_lossy().to_string());
                parent = dir.parent();
            }
            entries.insert(relative.clone());
        }
        Ok(entries)
    }
}

#[derive(Default)]
pub(crate) struct RecordingPostInstall {
    pub(crate) runs: RefCell<Vec<PathBuf>>,
    pub(crate) fail: Cell<bool>,
}

impl RecordingPostInstall {
    pub(crate) fn runs(&self) -> Vec<PathBuf> {
        self.runs.borrow().clone()
    }
}

impl PostInstall for RecordingPostInstall {
    fn run(&self, pack_dir: &Path) -> Result<()> {
        self.runs.borrow_mut().push(pack_dir.to_path_buf());
        if self.fail.get() {
            return Err(anyhow!("pip exited with status 1"));
        }
        Ok(())
    }
}

/// Pack root plus fakes for one engine test.
pub(crate) struct Fixture {
    pub(crate) root: PathBuf,
    pub(crate) registry: FakeRegistry,
    pub(crate) vcs: FakeVcs,
    pub(crate) fetcher: FakeFetcher,
    pub(crate) post_install: RecordingPostInstall,
}

impl Fixture {
    pub(crate) fn new(label: &str, registry: FakeRegistry, vcs: FakeVcs, fetcher: FakeFetcher) -> Self {
        Self {
            root: test_dir(label),
            registry,
            vcs,
            fetcher,
            post_install: RecordingPostInstall::default(),
        }
    }

    pub(crate) fn config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::for_root(self.root.join("custom_nodes"));
        config.retry = RetryPolicy::immediate(1);
        config
    }

    pub(crate) fn manager(&self) -> PackManager<'_> {
        self.manager_with(self.config())
    }

    pub(crate) fn manager_with(&self, config: ManagerConfig) -> PackManager<'_> {
        PackManager::new(
            config,
            Collaborators {
                registry: &self.registry,
                vcs: &self.vcs,
                fetcher: &self.fetcher,
                post_install: &self.post_install,
            },
        )
        .expect("must create manager")
    }

    pub(crate) fn pack_root(&self) -> PathBuf {
        self.root.join("custom_nodes")
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}
