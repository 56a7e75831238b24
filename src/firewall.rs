//! Forwarding policy
//!
//! Peers talk to each other through the server, so the FORWARD chain has to
//! accept their traffic. The policy is set globally and never reverted.

use tracing::info;

use crate::command::{run_checked, CommandRunner};
use crate::error::{WgError, WgResult};

pub struct FirewallController<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> FirewallController<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Set the default FORWARD policy to ACCEPT
    pub async fn allow_forwarding(&self) -> WgResult<()> {
        run_checked(self.runner, "iptables", &["-P", "FORWARD", "ACCEPT"])
            .await
            .map_err(|e| WgError::policy("unable to enable forwarding in the iptables", e))?;

        info!("Default FORWARD policy set to ACCEPT");
        Ok(())
    }
}
