mod error;
mod instance;
mod keyed;
mod metadata;
mod naming;
mod tracking;
mod version;

pub use error::{ErrorKind, PackError};
pub use instance::PackInstance;
pub use keyed::NormalizedKeyMap;
pub use metadata::{
    read_release_metadata, write_release_metadata, ReleaseMetadata, RELEASE_METADATA_FILE,
};
pub use naming::{
    compact_url, is_commit_hash, is_url_like, normalize_git_url, normalize_id, repository_name,
    split_pack_request,
};
pub use tracking::{
    collect_garbage, read_tracking_manifest, write_tracking_manifest, GarbagePlan,
    TRACKING_MANIFEST_FILE,
};
pub use version::{parse_release_version, VersionKind, VersionSpec};
