use std::fmt;

use nodepack_core::VersionSpec;

/// Where an unspecified version is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveScope {
    Active,
    Inactive,
    Global,
}

impl ResolveScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Global => "global",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "global" => Some(Self::Global),
            _ => None,
        }
    }
}

impl fmt::Display for ResolveScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRequest {
    pub id: String,
    pub spec: Option<VersionSpec>,
}
