//! Default interface config generation
//!
//! wireguard-ui expects a config file to already exist. When none is present
//! a fresh one is written with a newly generated private key.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::command::{run_checked, CommandRunner};
use crate::config::{InterfaceAddress, RuntimeConfig};
use crate::error::{WgError, WgResult};

/// UDP port written into a generated config
pub const DEFAULT_LISTEN_PORT: u16 = 51820;

/// Mode of a generated config file
pub const CONFIG_FILE_MODE: u32 = 0o700;

/// What `ensure_config` found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Something already exists at the path; it was left untouched
    Existing,
    /// A new config was generated
    Generated,
}

/// Comment block at the top of a generated config
const CONFIG_HEADER: &str = "\
# Generated by wgsyncd because no interface config existed.
# This file is managed by wireguard-ui; edits made there are applied to wg0
# automatically. Peers are added as [Peer] sections below.
";

/// Render the default config: a comment header and the `[Interface]` section
pub fn render_default_config(address: &InterfaceAddress, listen_port: u16, private_key: &str) -> String {
    format!(
        "{}\n[Interface]\nAddress = {}\nListenPort = {}\nPrivateKey = {}\n",
        CONFIG_HEADER, address, listen_port, private_key
    )
}

pub struct ConfigBootstrapper<'a> {
    runner: &'a dyn CommandRunner,
    listen_port: u16,
}

impl<'a> ConfigBootstrapper<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner, listen_port: DEFAULT_LISTEN_PORT }
    }

    /// Make sure a config file exists at the configured path.
    ///
    /// An existing entry is never inspected or rewritten, even if it is empty.
    pub async fn ensure_config(&self, config: &RuntimeConfig) -> WgResult<BootstrapOutcome> {
        let path = config.config_path();

        match tokio::fs::metadata(path).await {
            Ok(_) => {
                debug!("Config file {} already exists", path.display());
                return Ok(BootstrapOutcome::Existing);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WgError::bootstrap(
                    format!("unable to access the config file at {}", path.display()),
                    e,
                ));
            }
        }

        let private_key = self.generate_key().await?;
        let content = render_default_config(&config.interface_address(), self.listen_port, &private_key);
        write_config(path, &content).await?;

        info!("Generated a new server config at {}", path.display());
        Ok(BootstrapOutcome::Generated)
    }

    async fn generate_key(&self) -> WgResult<String> {
        let output = run_checked(self.runner, "wg", &["genkey"])
            .await
            .map_err(|e| WgError::bootstrap("unable to generate a new private key", e))?;

        let key = output.stdout_lossy().trim().to_string();
        if key.is_empty() {
            return Err(WgError::Bootstrap {
                message: "wg genkey produced no key".to_string(),
                source: None,
            });
        }
        Ok(key)
    }
}

async fn write_config(path: &Path, content: &str) -> WgResult<()> {
    create_private_file(path, content, CONFIG_FILE_MODE).await.map_err(|e| {
        WgError::bootstrap(
            format!("unable to write the default config to the file at {}", path.display()),
            e,
        )
    })?;

    debug!("Wrote config to {} with permissions {:o}", path.display(), CONFIG_FILE_MODE);
    Ok(())
}

/// Create `path` with `mode` already applied and write `content` to it.
///
/// Fails if anything, including a symlink, already exists at `path`.
pub(crate) async fn create_private_file(path: &Path, content: &str, mode: u32) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)
        .await?;

    // The umask may have narrowed the creation mode
    file.set_permissions(std::fs::Permissions::from_mode(mode)).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::command::CommandOutput;
    use crate::config::Subnet;
    use std::path::PathBuf;

    const KEY: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";

    fn runtime_config(path: PathBuf, subnet: &str) -> RuntimeConfig {
        RuntimeConfig { config_path: path, subnet: subnet.parse::<Subnet>().unwrap() }
    }

    #[test]
    fn test_render_default_config() {
        let subnet: Subnet = "10.32.42.0/24".parse().unwrap();
        let rendered = render_default_config(&subnet.interface_address(), 51820, KEY);
        assert!(rendered.starts_with("# Generated by wgsyncd"));
        assert!(rendered.lines().take_while(|l| !l.is_empty()).all(|l| l.starts_with('#')));
        assert!(rendered.ends_with(&format!(
            "\n[Interface]\nAddress = 10.32.42.1/24\nListenPort = 51820\nPrivateKey = {}\n",
            KEY
        )));
    }

    #[tokio::test]
    async fn test_generates_config_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let runner = ScriptedRunner::new().reply("wg genkey", CommandOutput::success(format!("{}\n", KEY)));

        let outcome = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path.clone(), "192.168.5.17/28"))
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::Generated);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(&format!("PrivateKey = {}\n", KEY)));
        assert!(content.contains("Address = 192.168.5.17/28\n"));
        assert!(content.contains("ListenPort = 51820\n"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, CONFIG_FILE_MODE);
        assert_eq!(runner.calls(), vec!["wg genkey".to_string()]);
    }

    #[tokio::test]
    async fn test_existing_empty_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        std::fs::write(&path, "").unwrap();
        let runner = ScriptedRunner::new();

        let outcome = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path.clone(), "10.32.42.0/24"))
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::Existing);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        assert!(runner.calls().is_empty(), "no key generation for an existing file");
    }

    #[tokio::test]
    async fn test_existing_malformed_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        std::fs::write(&path, "this is [not a config").unwrap();
        let runner = ScriptedRunner::new();

        let bootstrapper = ConfigBootstrapper::new(&runner);
        let config = runtime_config(path.clone(), "10.32.42.0/24");
        bootstrapper.ensure_config(&config).await.unwrap();
        bootstrapper.ensure_config(&config).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "this is [not a config");
    }

    #[tokio::test]
    async fn test_keygen_failure_is_bootstrap_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let runner = ScriptedRunner::new().spawn_error("wg genkey", io::ErrorKind::NotFound);

        let err = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path.clone(), "10.32.42.0/24"))
            .await
            .unwrap_err();

        assert!(matches!(err, WgError::Bootstrap { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_key_is_bootstrap_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wg0.conf");
        let runner = ScriptedRunner::new().reply("wg genkey", CommandOutput::success("\n"));

        let err = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path.clone(), "10.32.42.0/24"))
            .await
            .unwrap_err();

        assert!(matches!(err, WgError::Bootstrap { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_bootstrap_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("wg0.conf");
        let runner = ScriptedRunner::new().reply("wg genkey", CommandOutput::success(KEY));

        let err = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path, "10.32.42.0/24"))
            .await
            .unwrap_err();

        assert!(matches!(err, WgError::Bootstrap { .. }));
    }

    #[tokio::test]
    async fn test_dangling_symlink_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("elsewhere.conf");
        let path = dir.path().join("wg0.conf");
        std::os::unix::fs::symlink(&target, &path).unwrap();
        let runner = ScriptedRunner::new().reply("wg genkey", CommandOutput::success(KEY));

        let err = ConfigBootstrapper::new(&runner)
            .ensure_config(&runtime_config(path, "10.32.42.0/24"))
            .await
            .unwrap_err();

        assert!(matches!(err, WgError::Bootstrap { .. }));
        assert!(!target.exists(), "the key must not be written through the link");
    }
}
