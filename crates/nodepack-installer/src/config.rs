use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use nodepack_core::normalize_id;
use serde::{Deserialize, Serialize};

use crate::layout::PackLayout;
use crate::recovery::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "nodepack.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostInstallConfig {
    pub enabled: bool,
    pub interpreter: String,
}

impl Default for PostInstallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interpreter: "python".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub pack_root: PathBuf,
    pub registry_root: Option<PathBuf>,
    pub recovery_log: Option<PathBuf>,
    /// Clone repositories the registry does not know when asked by URL.
    pub allow_unregistered_git: bool,
    /// Ids that install, disable and uninstall refuse to touch.
    pub protected_ids: Vec<String>,
    pub retry: RetryPolicy,
    pub post_install: PostInstallConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pack_root: PathBuf::from("custom_nodes"),
            registry_root: None,
            recovery_log: None,
            allow_unregistered_git: true,
            protected_ids: Vec::new(),
            retry: RetryPolicy::default(),
            post_install: PostInstallConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn for_root(pack_root: impl Into<PathBuf>) -> Self {
        Self {
            pack_root: pack_root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse nodepack config")?;
        if config.pack_root.as_os_str().is_empty() {
            return Err(anyhow!("pack_root must not be empty"));
        }
        if config.retry.attempts == 0 {
            return Err(anyhow!("retry.attempts must be at least 1"));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::load_optional(path)?
            .ok_or_else(|| anyhow!("config file not found: {}", path.display()))
    }

    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading config: {}", path.display()))
            }
        };
        Self::from_toml_str(&content)
            .with_context(|| format!("failed loading config: {}", path.display()))
            .map(Some)
    }

    pub fn layout(&self) -> PackLayout {
        PackLayout::new(&self.pack_root)
    }

    pub fn recovery_log_path(&self) -> PathBuf {
        self.recovery_log
            .clone()
            .unwrap_or_else(|| self.layout().default_recovery_log_path())
    }

    pub fn is_protected(&self, id: &str) -> bool {
        let wanted = normalize_id(id);
        self.protected_ids
            .iter()
            .any(|protected| normalize_id(protected) == wanted)
    }
}
