use std::path::PathBuf;

use nodepack_core::{ErrorKind, PackInstance, VersionKind, VersionSpec};
use proptest::prelude::*;
use semver::Version;

use crate::{
    highest_release, parse_pack_request, resolve_version, select_active, select_inactive,
    select_preferred, ResolveScope,
};

fn instance(dir: &str, active: bool, version: VersionKind) -> PackInstance {
    PackInstance {
        id: "comfyui-foo".to_string(),
        path: PathBuf::from("/packs").join(dir),
        active,
        version,
        repo_url: None,
        original_name: None,
    }
}

fn release(major: u64, minor: u64, patch: u64) -> VersionKind {
    VersionKind::Release(Version::new(major, minor, patch))
}

#[test]
fn inactive_scope_prefers_highest_release_over_nightly() {
    let instances = vec![
        instance(".disabled/comfyui-foo@1_0_0", false, release(1, 0, 0)),
        instance(".disabled/comfyui-foo@nightly", false, VersionKind::Nightly),
        instance(".disabled/comfyui-foo@1_0_2", false, release(1, 0, 2)),
    ];

    let resolved = resolve_version(
        "comfyui-foo",
        &instances,
        None,
        ResolveScope::Inactive,
        None,
    )
    .expect("must resolve");
    assert_eq!(resolved, release(1, 0, 2));
}

#[test]
fn inactive_scope_falls_back_to_nightly_then_unknown() {
    let nightly_only = vec![
        instance(".disabled/comfyui-foo@unknown", false, VersionKind::Unknown),
        instance(".disabled/comfyui-foo@nightly", false, VersionKind::Nightly),
    ];
    assert_eq!(
        resolve_version("comfyui-foo", &nightly_only, None, ResolveScope::Inactive, None)
            .expect("must resolve"),
        VersionKind::Nightly
    );

    let unknown_only = vec![instance(".disabled/comfyui-foo@unknown", false, VersionKind::Unknown)];
    assert_eq!(
        resolve_version("comfyui-foo", &unknown_only, None, ResolveScope::Inactive, None)
            .expect("must resolve"),
        VersionKind::Unknown
    );

    let active_only = vec![instance("ComfyUI-Foo", true, release(1, 0, 0))];
    let err = resolve_version("comfyui-foo", &active_only, None, ResolveScope::Inactive, None)
        .expect_err("active instances are not candidates");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn active_scope_reports_enabled_version() {
    let instances = vec![
        instance(".disabled/comfyui-foo@1_0_2", false, release(1, 0, 2)),
        instance("ComfyUI-Foo", true, VersionKind::Nightly),
    ];
    assert_eq!(
        resolve_version("comfyui-foo", &instances, None, ResolveScope::Active, None)
            .expect("must resolve"),
        VersionKind::Nightly
    );

    let err = resolve_version("comfyui-foo", &instances[..1], None, ResolveScope::Active, None)
        .expect_err("nothing enabled");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn global_scope_includes_registry_latest() {
    let instances = vec![
        instance("ComfyUI-Foo", true, release(1, 0, 1)),
        instance(".disabled/comfyui-foo@nightly", false, VersionKind::Nightly),
    ];
    let remote = Version::new(1, 2, 0);
    assert_eq!(
        resolve_version("comfyui-foo", &instances, None, ResolveScope::Global, Some(&remote))
            .expect("must resolve"),
        release(1, 2, 0)
    );

    let older_remote = Version::new(1, 0, 0);
    assert_eq!(
        resolve_version(
            "comfyui-foo",
            &instances,
            None,
            ResolveScope::Global,
            Some(&older_remote)
        )
        .expect("must resolve"),
        release(1, 0, 1)
    );

    assert_eq!(
        resolve_version("comfyui-foo", &instances[1..], None, ResolveScope::Global, None)
            .expect("must resolve"),
        VersionKind::Nightly
    );
    let err = resolve_version("comfyui-foo", &[], None, ResolveScope::Global, None)
        .expect_err("nothing known");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn explicit_spec_wins_over_scope() {
    let remote = Version::new(3, 0, 0);
    assert_eq!(
        resolve_version(
            "comfyui-foo",
            &[],
            Some(&VersionSpec::Latest),
            ResolveScope::Active,
            Some(&remote)
        )
        .expect("must resolve"),
        release(3, 0, 0)
    );
    let err = resolve_version(
        "comfyui-foo",
        &[],
        Some(&VersionSpec::Latest),
        ResolveScope::Global,
        None,
    )
    .expect_err("latest needs the registry");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        resolve_version(
            "comfyui-foo",
            &[],
            Some(&VersionSpec::Commit("a".repeat(40))),
            ResolveScope::Global,
            None
        )
        .expect("must resolve"),
        VersionKind::Nightly
    );
}

#[test]
fn url_like_ids_resolve_to_nightly() {
    let spec = VersionSpec::Exact(Version::new(1, 0, 0));
    assert_eq!(
        resolve_version(
            "https://github.com/owner/ComfyUI-Foo",
            &[],
            Some(&spec),
            ResolveScope::Global,
            None
        )
        .expect("must resolve"),
        VersionKind::Nightly
    );
}

#[test]
fn select_inactive_requires_exact_match_when_asked() {
    let instances = vec![
        instance("ComfyUI-Foo", true, release(1, 0, 1)),
        instance(".disabled/comfyui-foo@1_0_0", false, release(1, 0, 0)),
        instance(".disabled/comfyui-foo@nightly", false, VersionKind::Nightly),
    ];
    let nightly = select_inactive(&instances, Some(&VersionKind::Nightly)).expect("must select");
    assert!(nightly.is_nightly());
    assert!(select_inactive(&instances, Some(&release(1, 0, 1))).is_none());
    assert_eq!(
        select_inactive(&instances, None).map(|i| i.version.clone()),
        Some(release(1, 0, 0))
    );
    assert!(select_active(&instances).expect("must select").active);
    assert!(select_preferred(&instances).expect("must select").active);
    assert_eq!(
        select_preferred(&instances[1..]).map(|i| i.version.clone()),
        Some(release(1, 0, 0))
    );
}

#[test]
fn parse_pack_request_reads_optional_spec() {
    let request = parse_pack_request("comfyui-foo@1.0.2").expect("must parse");
    assert_eq!(request.id, "comfyui-foo");
    assert_eq!(request.spec, Some(VersionSpec::Exact(Version::new(1, 0, 2))));

    let request = parse_pack_request("comfyui-foo").expect("must parse");
    assert_eq!(request.spec, None);

    let request = parse_pack_request("git@github.com:owner/repo.git").expect("must parse");
    assert_eq!(request.id, "git@github.com:owner/repo.git");
    assert_eq!(request.spec, None);

    assert!(parse_pack_request("comfyui-foo@not.a.version.spec").is_err());
    assert!(parse_pack_request("@1.0.0").is_err());
}

#[test]
fn scope_parses_known_names() {
    assert_eq!(ResolveScope::parse("Inactive"), Some(ResolveScope::Inactive));
    assert_eq!(ResolveScope::parse("world"), None);
    assert_eq!(ResolveScope::Global.to_string(), "global");
}

proptest! {
    #[test]
    fn property_highest_release_picks_first_of_the_maximum(
        versions in proptest::collection::vec((0u64..4, 0u64..4, 0u64..4), 1..12)
    ) {
        let instances = versions
            .iter()
            .enumerate()
            .map(|(index, (major, minor, patch))| {
                instance(&format!("pack-{index}"), false, release(*major, *minor, *patch))
            })
            .collect::<Vec<_>>();

        let selected = highest_release(&instances).expect("non-empty input must select");
        let selected_version = selected.version.release().cloned().expect("release");
        let max = instances
            .iter()
            .filter_map(|i| i.version.release())
            .max()
            .cloned()
            .expect("non-empty");
        prop_assert_eq!(&selected_version, &max);

        let first_max = instances
            .iter()
            .find(|i| i.version.release() == Some(&max))
            .expect("max exists");
        prop_assert_eq!(&selected.path, &first_max.path);
    }
}
