//! Kernel module loading
//!
//! Makes sure the wireguard module is present before the interface is
//! created. The check reads `/proc/modules`; loading goes through `modprobe`.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::command::{run_checked, CommandRunner};
use crate::error::{WgError, WgResult};
use crate::validation;

/// Module providing the wireguard link type
pub const WIREGUARD_MODULE: &str = "wireguard";

/// Kernel listing of loaded modules
pub const PROC_MODULES: &str = "/proc/modules";

/// Ensures a kernel module is loaded
pub struct ModuleLoader<'a> {
    runner: &'a dyn CommandRunner,
    name: String,
    listing: PathBuf,
}

impl<'a> ModuleLoader<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            name: WIREGUARD_MODULE.to_string(),
            listing: PathBuf::from(PROC_MODULES),
        }
    }

    /// Read the loaded module list from another file
    pub fn with_listing(mut self, listing: impl Into<PathBuf>) -> Self {
        self.listing = listing.into();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_module(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether the module is currently loaded
    pub async fn is_loaded(&self) -> WgResult<bool> {
        let listing = read_listing(&self.listing).await?;
        Ok(listing_contains(&listing, &self.name))
    }

    /// Load the module unless it is already active. Safe to call repeatedly.
    pub async fn ensure_loaded(&self) -> WgResult<()> {
        validation::validate_module_name(&self.name)?;

        if self.is_loaded().await? {
            info!("The {} module is already loaded", self.name);
            return Ok(());
        }

        match run_checked(self.runner, "modprobe", &[self.name.as_str()]).await {
            Ok(_) => {
                info!("Loaded the {} kernel module", self.name);
                Ok(())
            }
            Err(load_err) => {
                // Another process may have loaded it between our check and
                // the modprobe call.
                if self.is_loaded().await.unwrap_or(false) {
                    warn!(
                        "Loading {} failed but the module is now present, assuming a concurrent load: {}",
                        self.name, load_err
                    );
                    return Ok(());
                }
                Err(WgError::capability(
                    format!("unable to load the {} kernel module", self.name),
                    load_err,
                ))
            }
        }
    }
}

async fn read_listing(path: &Path) -> WgResult<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        WgError::capability(format!("unable to read modules from {}", path.display()), e)
    })
}

/// True when a line of the listing starts with `name` followed by a space,
/// so `wireguard` does not match `wireguard_extra`.
pub fn listing_contains(listing: &str, name: &str) -> bool {
    listing.lines().any(|line| {
        line.strip_prefix(name)
            .map(|rest| rest.starts_with(' '))
            .unwrap_or(false)
    })
}
