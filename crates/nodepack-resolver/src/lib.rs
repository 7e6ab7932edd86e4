mod resolve;
mod select;
mod types;

pub use resolve::{parse_pack_request, resolve_version};
pub use select::{highest_release, select_active, select_inactive, select_preferred};
pub use types::{PackRequest, ResolveScope};

#[cfg(test)]
mod tests;
