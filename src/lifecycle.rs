//! Interface lifecycle
//!
//! Startup is a fixed sequence of steps, each a precondition for the next:
//! load the module, create the interface, open forwarding, make sure a
//! config exists, apply it, bring the link up. Once that has succeeded the
//! reconciliation loop takes over.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use tracing::{error, info};

use crate::apply::{ConfigApplier, ConfigApply};
use crate::bootstrap::{BootstrapOutcome, ConfigBootstrapper};
use crate::command::CommandRunner;
use crate::config::RuntimeConfig;
use crate::error::WgResult;
use crate::firewall::FirewallController;
use crate::interface::InterfaceController;
use crate::kmod::ModuleLoader;
use crate::watch::{ChangeSource, ReconcileLoop, ReconcileStats};

/// One startup step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LoadModule,
    CreateInterface,
    AllowForwarding,
    BootstrapConfig,
    ApplyConfig,
    ActivateInterface,
}

impl Step {
    /// Startup order
    pub const STARTUP: [Step; 6] = [
        Step::LoadModule,
        Step::CreateInterface,
        Step::AllowForwarding,
        Step::BootstrapConfig,
        Step::ApplyConfig,
        Step::ActivateInterface,
    ];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::LoadModule => "load the wireguard module",
            Step::CreateInterface => "create the interface",
            Step::AllowForwarding => "allow forwarding",
            Step::BootstrapConfig => "initialize the config",
            Step::ApplyConfig => "apply the initial config",
            Step::ActivateInterface => "set the interface up",
        };
        f.write_str(name)
    }
}

/// Run `steps` in order, stopping at the first failure. Steps after a
/// failed one are never started.
pub async fn run_pipeline<S, F, Fut>(steps: &[S], mut run: F) -> WgResult<()>
where
    S: Copy + fmt::Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = WgResult<()>>,
{
    let total = steps.len();
    for (index, step) in steps.iter().copied().enumerate() {
        info!("[{}/{}] {}", index + 1, total, step);
        if let Err(e) = run(step).await {
            error!(step = %step, kind = e.kind(), "Startup step failed");
            return Err(e);
        }
    }
    Ok(())
}

/// Owns the per-step controllers for one interface
pub struct Lifecycle<'a> {
    config: &'a RuntimeConfig,
    modules: ModuleLoader<'a>,
    interface: InterfaceController<'a>,
    firewall: FirewallController<'a>,
    bootstrapper: ConfigBootstrapper<'a>,
    applier: ConfigApplier<'a>,
}

impl<'a> Lifecycle<'a> {
    pub fn new(config: &'a RuntimeConfig, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            modules: ModuleLoader::new(runner),
            interface: InterfaceController::new(runner),
            firewall: FirewallController::new(runner),
            bootstrapper: ConfigBootstrapper::new(runner),
            applier: ConfigApplier::new(runner),
        }
    }

    /// Read loaded modules from `path` instead of `/proc/modules`
    pub fn with_module_listing(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules = self.modules.with_listing(path);
        self
    }

    /// Write the stripped config to `path` instead of `/tmp/wg0.conf`
    pub fn with_scratch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.applier = self.applier.with_scratch_path(path);
        self
    }

    async fn run_step(&self, step: Step) -> WgResult<()> {
        match step {
            Step::LoadModule => self.modules.ensure_loaded().await,
            Step::CreateInterface => self.interface.provision(&self.config.interface_address()).await,
            Step::AllowForwarding => self.firewall.allow_forwarding().await,
            Step::BootstrapConfig => {
                if self.bootstrapper.ensure_config(self.config).await? == BootstrapOutcome::Existing {
                    info!("Using existing config at {}", self.config.config_path().display());
                }
                Ok(())
            }
            Step::ApplyConfig => self.applier.apply(self.config).await,
            Step::ActivateInterface => self.interface.up().await,
        }
    }

    /// Bring the interface from absent to configured and running
    pub async fn start(&self) -> WgResult<()> {
        run_pipeline(&Step::STARTUP, |step| self.run_step(step)).await?;
        info!("Initialization complete, starting the config monitoring");
        Ok(())
    }

    /// Start, then reconcile on every config write until a fatal error or
    /// until `shutdown` completes.
    pub async fn run_until<S, F>(&self, source: S, shutdown: F) -> WgResult<ReconcileStats>
    where
        S: ChangeSource,
        F: Future<Output = ()>,
    {
        self.start().await?;
        let mut reconcile = ReconcileLoop::new(self.config, source, &self.applier);
        reconcile.run_until(shutdown).await
    }
}
