//! Running external CLI tools as entry sources.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::ClientError;

/// An external command with fixed trailing arguments and a deadline.
#[derive(Debug, Clone)]
pub struct CommandClient {
    program: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            extra_args,
            timeout,
        }
    }

    /// Runs the command with `args` followed by the configured extra
    /// arguments and returns its stdout.
    ///
    /// The child is killed if it does not finish before the deadline.
    pub async fn output(&self, args: &[String]) -> Result<Vec<u8>, ClientError> {
        debug!(program = %self.program, ?args, "running command");

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .args(&self.extra_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))?
            .map_err(|source| ClientError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ClientError::CommandFailed {
                command: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
