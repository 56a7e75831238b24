//! Live config synchronisation
//!
//! The on-disk file is the only source of truth. Every apply strips it with
//! `wg-quick strip` and feeds the result to `wg syncconf`, which updates
//! peers in place without dropping existing sessions.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::bootstrap::create_private_file;
use crate::command::{run_checked, CommandRunner};
use crate::config::RuntimeConfig;
use crate::error::{CommandError, WgError, WgResult};
use crate::interface::INTERFACE_NAME;

/// Where the stripped config is written before syncing
pub const SCRATCH_PATH: &str = "/tmp/wg0.conf";

const SCRATCH_FILE_MODE: u32 = 0o600;

/// Something that can push the current config file to the live interface
#[async_trait]
pub trait ConfigApply: Send + Sync {
    async fn apply(&self, config: &RuntimeConfig) -> WgResult<()>;
}

pub struct ConfigApplier<'a> {
    runner: &'a dyn CommandRunner,
    interface: String,
    scratch_path: PathBuf,
}

impl<'a> ConfigApplier<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            interface: INTERFACE_NAME.to_string(),
            scratch_path: PathBuf::from(SCRATCH_PATH),
        }
    }

    pub fn with_scratch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_path = path.into();
        self
    }

    async fn strip(&self, config_path: &Path) -> WgResult<String> {
        let path = config_path.to_str().ok_or_else(|| WgError::Apply {
            message: format!("config path {:?} is not valid UTF-8", config_path),
            output: String::new(),
        })?;

        let output = run_checked(self.runner, "wg-quick", &["strip", path])
            .await
            .map_err(|e| apply_error("unable to strip the wireguard config", e))?;

        Ok(output.stdout_lossy())
    }

    /// Replace the scratch file with a fresh one holding `payload`.
    ///
    /// Whatever sits at the scratch path is unlinked first, so a file or
    /// symlink planted there by another user is never written through.
    async fn write_scratch(&self, payload: &str) -> WgResult<()> {
        let io_err = |e: io::Error| WgError::Apply {
            message: format!("unable to write {}: {}", self.scratch_path.display(), e),
            output: String::new(),
        };

        match tokio::fs::remove_file(&self.scratch_path).await {
            Ok(()) => debug!("Removed stale {}", self.scratch_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        create_private_file(&self.scratch_path, payload, SCRATCH_FILE_MODE)
            .await
            .map_err(io_err)?;

        debug!("Wrote stripped config to {}", self.scratch_path.display());
        Ok(())
    }

    async fn sync(&self) -> WgResult<()> {
        let scratch = self.scratch_path.to_str().ok_or_else(|| WgError::Apply {
            message: format!("scratch path {:?} is not valid UTF-8", self.scratch_path),
            output: String::new(),
        })?;

        run_checked(self.runner, "wg", &["syncconf", self.interface.as_str(), scratch])
            .await
            .map_err(|e| apply_error("unable to sync the wireguard config", e))?;

        Ok(())
    }
}

#[async_trait]
impl ConfigApply for ConfigApplier<'_> {
    async fn apply(&self, config: &RuntimeConfig) -> WgResult<()> {
        let payload = self.strip(config.config_path()).await?;

        if payload.trim().is_empty() {
            return Err(WgError::Apply {
                message: format!("stripped config from {} is empty", config.config_path().display()),
                output: payload,
            });
        }

        self.write_scratch(&payload).await?;
        self.sync().await?;

        info!("Applied {} to interface {}", config.config_path().display(), self.interface);
        Ok(())
    }
}

fn apply_error(message: &str, err: CommandError) -> WgError {
    WgError::Apply {
        message: format!("{}: {}", message, err.summary()),
        output: err.output().to_string(),
    }
}
