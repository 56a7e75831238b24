//! Error types for wgsync

use std::io;
use thiserror::Error;

/// Failure of a single external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started at all
    #[error("failed to execute '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: io::Error,
    },
    /// The program ran and exited unsuccessfully
    #[error("'{cmd}' exited with {}: {output}", exit_code_label(.code))]
    Failed {
        cmd: String,
        code: Option<i32>,
        output: String,
    },
}

impl CommandError {
    /// Combined stdout/stderr of a failed command, empty for spawn failures
    pub fn output(&self) -> &str {
        match self {
            CommandError::Spawn { .. } => "",
            CommandError::Failed { output, .. } => output,
        }
    }

    /// The error without the captured output, for errors that carry the
    /// output separately
    pub fn summary(&self) -> String {
        match self {
            CommandError::Spawn { .. } => self.to_string(),
            CommandError::Failed { cmd, code, .. } => {
                format!("'{}' exited with {}", cmd, exit_code_label(code))
            }
        }
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (killed by signal)".to_string(),
    }
}

/// Boxed source for errors that wrap either a command failure or I/O.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide error, one variant per stage of the interface lifecycle.
#[derive(Debug, Error)]
pub enum WgError {
    /// Bad environment override
    #[error("configuration error: {0}")]
    Config(String),

    /// Kernel module query or load failed
    #[error("unable to load the wireguard module: {message}")]
    Capability {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Interface creation or address assignment failed
    #[error("unable to set up the interface: {message}")]
    Provisioning {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Forwarding policy could not be set
    #[error("unable to configure the forwarding policy: {message}")]
    Policy {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Key generation or default config write failed
    #[error("unable to initialize the config: {message}")]
    Bootstrap {
        message: String,
        #[source]
        source: Option<Cause>,
    },

    /// Strip or sync failed; `output` holds what the tool printed
    #[error("unable to apply the config: {message}{}", format_output(.output))]
    Apply { message: String, output: String },

    /// Setting the interface up failed
    #[error("unable to set the interface up: {message}{}", format_output(.output))]
    Activation { message: String, output: String },

    /// File change subscription failed
    #[error("unable to watch the config: {message}")]
    Watch {
        message: String,
        #[source]
        source: Option<Cause>,
    },
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

impl WgError {
    pub fn capability(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        WgError::Capability { message: message.into(), source: Some(source.into()) }
    }

    pub fn provisioning(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        WgError::Provisioning { message: message.into(), source: Some(source.into()) }
    }

    pub fn policy(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        WgError::Policy { message: message.into(), source: Some(source.into()) }
    }

    pub fn bootstrap(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        WgError::Bootstrap { message: message.into(), source: Some(source.into()) }
    }

    pub fn watch(message: impl Into<String>, source: impl Into<Cause>) -> Self {
        WgError::Watch { message: message.into(), source: Some(source.into()) }
    }

    /// Short stage name, used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            WgError::Config(_) => "config",
            WgError::Capability { .. } => "capability",
            WgError::Provisioning { .. } => "provisioning",
            WgError::Policy { .. } => "policy",
            WgError::Bootstrap { .. } => "bootstrap",
            WgError::Apply { .. } => "apply",
            WgError::Activation { .. } => "activation",
            WgError::Watch { .. } => "watch",
        }
    }
}

pub type WgResult<T> = Result<T, WgError>;
