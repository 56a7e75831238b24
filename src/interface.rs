//! WireGuard interface control
//!
//! Creates the `wg0` link, assigns its address and brings it up, all via the
//! `ip` command.

use tracing::info;

use crate::command::{run_checked, CommandRunner};
use crate::config::InterfaceAddress;
use crate::error::{CommandError, WgError, WgResult};
use crate::validation;

/// Name of the managed interface
pub const INTERFACE_NAME: &str = "wg0";

/// Interface controller
pub struct InterfaceController<'a> {
    runner: &'a dyn CommandRunner,
    name: String,
}

impl<'a> InterfaceController<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner, name: INTERFACE_NAME.to_string() }
    }

    #[cfg(test)]
    pub(crate) fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Create the wireguard link and give it `address`.
    ///
    /// An existing link with the same name (left over from an unclean
    /// shutdown) is an error, not something to clean up here.
    pub async fn provision(&self, address: &InterfaceAddress) -> WgResult<()> {
        validation::validate_interface_name(&self.name)?;

        self.run_ip(&["link", "add", self.name.as_str(), "type", "wireguard"])
            .await
            .map_err(|e| WgError::provisioning(format!("unable to create the interface {}", self.name), e))?;

        let addr = address.to_string();
        self.run_ip(&["addr", "add", addr.as_str(), "dev", self.name.as_str()])
            .await
            .map_err(|e| {
                WgError::provisioning(format!("unable to set {} on the interface {}", addr, self.name), e)
            })?;

        info!("Created interface {} with address {}", self.name, addr);
        Ok(())
    }

    /// Bring the interface up
    pub async fn up(&self) -> WgResult<()> {
        validation::validate_interface_name(&self.name)?;

        self.run_ip(&["link", "set", self.name.as_str(), "up"])
            .await
            .map_err(|e| WgError::Activation {
                message: e.summary(),
                output: e.output().to_string(),
            })?;

        info!("Interface {} is up", self.name);
        Ok(())
    }

    // === Helper functions ===

    async fn run_ip(&self, args: &[&str]) -> Result<(), CommandError> {
        run_checked(self.runner, "ip", args).await.map(|_| ())
    }
}
