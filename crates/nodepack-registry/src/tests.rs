use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TEST_REGISTRY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_registry_root() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "nodepack-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_REGISTRY_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

fn write_manifest(root: &Path, dir_name: &str, version: &str, repository: Option<&str>) {
    let package_dir = root.join("index").join(dir_name);
    fs::create_dir_all(&package_dir).expect("must create package dir");
    let mut content = format!(
        "id = \"comfyui-foo\"\nname = \"ComfyUI-Foo\"\nversion = \"{version}\"\ndownload_url = \"https://cdn.example.test/comfyui-foo/{version}.zip\"\nsha256 = \"abc\"\n"
    );
    if let Some(repository) = repository {
        content.push_str(&format!("repository = \"{repository}\"\n"));
    }
    fs::write(package_dir.join(format!("{version}.toml")), content).expect("must write manifest");
}

#[test]
fn lookup_returns_releases_newest_first() {
    let root = test_registry_root();
    write_manifest(&root, "comfyui-foo", "1.0.1", None);
    write_manifest(&root, "comfyui-foo", "1.0.10", Some("https://github.com/owner/ComfyUI-Foo"));
    write_manifest(&root, "comfyui-foo", "1.0.2", None);

    let registry = FsRegistry::open(&root);
    let package = registry
        .lookup("ComfyUI-Foo")
        .expect("lookup must succeed")
        .expect("package must exist");

    assert_eq!(package.id, "comfyui-foo");
    assert_eq!(package.name, "ComfyUI-Foo");
    assert_eq!(
        package.repository.as_deref(),
        Some("https://github.com/owner/ComfyUI-Foo")
    );
    let versions = package
        .releases
        .iter()
        .map(|release| release.version.to_string())
        .collect::<Vec<_>>();
    assert_eq!(versions, vec!["1.0.10", "1.0.2", "1.0.1"]);
    assert_eq!(
        package.latest_version().map(|v| v.to_string()).as_deref(),
        Some("1.0.10")
    );
    assert_eq!(
        package
            .release(&semver::Version::new(1, 0, 2))
            .map(|release| release.download_url.as_str()),
        Some("https://cdn.example.test/comfyui-foo/1.0.2.zip")
    );
    assert!(package.release(&semver::Version::new(9, 9, 9)).is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn lookup_missing_package_is_none() {
    let root = test_registry_root();
    let registry = FsRegistry::open(&root);
    assert_eq!(registry.lookup("absent").expect("lookup must succeed"), None);

    fs::create_dir_all(root.join("index").join("empty")).expect("must create dir");
    assert_eq!(registry.lookup("empty").expect("lookup must succeed"), None);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn lookup_by_repository_matches_compact_url_case_insensitively() {
    let root = test_registry_root();
    write_manifest(
        &root,
        "comfyui-foo",
        "1.0.0",
        Some("https://github.com/Owner/ComfyUI-Foo.git"),
    );

    let registry = FsRegistry::open(&root);
    let package = registry
        .lookup_by_repository("owner/comfyui-foo")
        .expect("lookup must succeed")
        .expect("package must exist");
    assert_eq!(package.id, "comfyui-foo");
    assert_eq!(
        registry
            .lookup_by_repository("other/repo")
            .expect("lookup must succeed"),
        None
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn invalid_manifest_is_reported() {
    let root = test_registry_root();
    let package_dir = root.join("index").join("broken");
    fs::create_dir_all(&package_dir).expect("must create dir");
    fs::write(
        package_dir.join("1.0.0.toml"),
        "id = \"broken\"\nversion = \"not-a-version\"\ndownload_url = \"x\"\n",
    )
    .expect("must write manifest");

    let err = FsRegistry::open(&root)
        .lookup("broken")
        .expect_err("must reject invalid manifest");
    assert!(format!("{err:#}").contains("invalid version"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn no_registry_knows_nothing() {
    assert_eq!(NoRegistry.lookup("x").expect("must answer"), None);
    assert_eq!(NoRegistry.lookup_by_repository("o/r").expect("must answer"), None);
}
