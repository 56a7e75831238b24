//! wgsync - WireGuard interface provisioning and config sync
//!
//! Brings up a `wg0` interface for a wireguard-ui managed server and keeps
//! it in sync with the config file:
//! - Kernel module loading
//! - Interface creation and addressing
//! - Forwarding policy
//! - Default config generation
//! - Live config application via `wg syncconf`
//! - File change driven reconciliation

pub mod error;
pub mod validation;
pub mod config;
pub mod command;
pub mod kmod;
pub mod interface;
pub mod firewall;
pub mod bootstrap;
pub mod apply;
pub mod watch;
pub mod lifecycle;

// Re-export commonly used types
pub use error::{CommandError, WgError, WgResult};
pub use config::{InterfaceAddress, RuntimeConfig, Subnet};
pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use kmod::ModuleLoader;
pub use interface::{InterfaceController, INTERFACE_NAME};
pub use firewall::FirewallController;
pub use bootstrap::{BootstrapOutcome, ConfigBootstrapper};
pub use apply::{ConfigApplier, ConfigApply};
pub use watch::{ChangeEvent, ChangeKind, ChangeSource, LoopState, NotifySource, ReconcileLoop, ReconcileStats};
pub use lifecycle::{Lifecycle, Step};
