use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tracing::info;

use crate::fs_utils::run_command;

/// Hook run inside a pack directory after new content lands there.
pub trait PostInstall {
    fn run(&self, pack_dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPostInstall;

impl PostInstall for NoopPostInstall {
    fn run(&self, _pack_dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Installs `requirements.txt` with pip and runs `install.py` when present.
#[derive(Debug, Clone)]
pub struct PythonPostInstall {
    interpreter: String,
}

impl PythonPostInstall {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl PostInstall for PythonPostInstall {
    fn run(&self, pack_dir: &Path) -> Result<()> {
        if pack_dir.join("requirements.txt").is_file() {
            info!(pack = %pack_dir.display(), "installing pack requirements");
            run_command(
                Command::new(&self.interpreter)
                    .args(["-m", "pip", "install", "-r", "requirements.txt"])
                    .current_dir(pack_dir),
                &format!("failed installing requirements for {}", pack_dir.display()),
            )?;
        }
        if pack_dir.join("install.py").is_file() {
            info!(pack = %pack_dir.display(), "running pack install script");
            run_command(
                Command::new(&self.interpreter)
                    .arg("install.py")
                    .current_dir(pack_dir),
                &format!("failed running install.py for {}", pack_dir.display()),
            )?;
        }
        Ok(())
    }
}
