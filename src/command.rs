//! External process boundary
//!
//! Every lifecycle step talks to the system through `ip`, `iptables`, `wg`,
//! `wg-quick` and `modprobe`. They are all invoked through [`CommandRunner`]
//! so the steps can be exercised against a scripted runner in tests.

use async_trait::async_trait;
use std::io;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::error::CommandError;

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self { code: Some(0), success: true, stdout: stdout.into(), stderr: Vec::new() }
    }

    pub fn failure(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self { code: Some(code), success: false, stdout: Vec::new(), stderr: stderr.into() }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// stdout followed by stderr, the way a terminal would show them
    pub fn combined(&self) -> String {
        let mut combined = String::from_utf8_lossy(&self.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&self.stderr));
        combined
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Synchronous-in-effect process execution: the caller waits for exit.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` and capture its output. Only a failure to
    /// spawn is an `Err`; a non-zero exit comes back as an output.
    async fn output(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runs commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output().await?;
        Ok(output.into())
    }
}

/// Render a command line for logs and error messages
pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Run a command and turn a spawn failure or non-zero exit into a
/// [`CommandError`]. On success the full output is returned.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<CommandOutput, CommandError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let cmd = command_line(program, &args);
    debug!("Running: {}", cmd);

    let output = runner
        .output(program, &args)
        .await
        .map_err(|source| CommandError::Spawn { cmd: cmd.clone(), source })?;

    if !output.success {
        return Err(CommandError::Failed { cmd, code: output.code, output: output.combined() });
    }

    Ok(output)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner used by the lifecycle step tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies to commands in the order they were scripted and records
    /// every invocation. Unscripted commands succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        replies: Mutex<VecDeque<(String, io::Result<CommandOutput>)>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the reply for the next invocation whose command line
        /// starts with `prefix`.
        pub fn reply(self, prefix: &str, output: CommandOutput) -> Self {
            self.replies.lock().unwrap().push_back((prefix.to_string(), Ok(output)));
            self
        }

        pub fn spawn_error(self, prefix: &str, kind: io::ErrorKind) -> Self {
            self.replies
                .lock()
                .unwrap()
                .push_back((prefix.to_string(), Err(io::Error::new(kind, "spawn failed"))));
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn output(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
            let line = command_line(program, args);
            self.calls.lock().unwrap().push(line.clone());

            let mut replies = self.replies.lock().unwrap();
            if let Some(pos) = replies.iter().position(|(prefix, _)| line.starts_with(prefix.as_str())) {
                if let Some((_, reply)) = replies.remove(pos) {
                    return reply;
                }
            }
            Ok(CommandOutput::success(Vec::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn test_combined_output_order() {
        let output = CommandOutput {
            code: Some(1),
            success: false,
            stdout: b"out\n".to_vec(),
            stderr: b"err\n".to_vec(),
        };
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("wg", &["genkey".to_string()]), "wg genkey");
        assert_eq!(command_line("true", &[]), "true");
    }

    #[tokio::test]
    async fn test_run_checked_maps_failures() {
        let runner = ScriptedRunner::new()
            .reply("ip link add", CommandOutput::failure(2, "RTNETLINK answers: File exists\n"))
            .spawn_error("iptables", io::ErrorKind::NotFound);

        let err = run_checked(&runner, "ip", &["link", "add", "wg0", "type", "wireguard"])
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { cmd, code, output } => {
                assert_eq!(cmd, "ip link add wg0 type wireguard");
                assert_eq!(code, Some(2));
                assert!(output.contains("File exists"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = run_checked(&runner, "iptables", &["-P", "FORWARD", "ACCEPT"]).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));

        let ok = run_checked(&runner, "wg", &["show"]).await;
        tokio_test::assert_ok!(ok);
        assert_eq!(runner.calls().len(), 3);
    }
}
