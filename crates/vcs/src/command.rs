//! Bounded external-process runner
//!
//! Every git/restic call goes through [`ToolCommand`], which enforces a
//! timeout so a hung tool cannot hold the backup guard forever. The child is
//! spawned with `kill_on_drop`, so timing out kills it.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// External tool failures
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The binary could not be started (missing or misconfigured)
    #[error("{program} is not available: {reason}")]
    Unavailable {
        program: &'static str,
        #[source]
        reason: io::Error,
    },

    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout {
        program: &'static str,
        timeout: Duration,
    },

    #[error("{command} failed (exit code {code}): {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("I/O error while running {program}: {reason}")]
    Io {
        program: &'static str,
        #[source]
        reason: io::Error,
    },

    #[error("failed to parse {program} output: {reason}")]
    Parse {
        program: &'static str,
        reason: String,
    },

    #[error("failed to write {path}: {reason}")]
    Write {
        path: PathBuf,
        #[source]
        reason: io::Error,
    },
}

impl ToolError {
    /// Whether the failure means the tool itself is missing or unusable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ToolError::Unavailable { .. })
    }
}

/// Captured output of a finished tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code (-1 if killed by a signal)
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Builder for one external tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: &'static str,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(&'static str, String)>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: &'static str, timeout: Duration) -> Self {
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.envs.push((key, value.into()));
        self
    }

    /// Human-readable command line for logs and errors
    pub fn display(&self) -> String {
        let mut line = self.program.to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run and capture output; a non-zero exit is not an error here
    pub async fn output(&self) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        debug!(command = %self.display(), "Running external tool");

        let child = command.spawn().map_err(|reason| ToolError::Unavailable {
            program: self.program,
            reason,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: self.program,
                    timeout: self.timeout,
                })
            }
            Ok(result) => result.map_err(|reason| ToolError::Io {
                program: self.program,
                reason,
            })?,
        };

        Ok(ToolOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Run and require a zero exit code
    pub async fn run(&self) -> Result<ToolOutput, ToolError> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(ToolError::Failed {
                command: self.display(),
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let err = ToolCommand::new("definitely-not-a-real-tool-xyz", Duration::from_secs(5))
            .output()
            .await
            .unwrap_err();

        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let output = ToolCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "printf hello; echo oops >&2; exit 3"])
            .output()
            .await
            .unwrap();

        assert_eq!(output.code, 3);
        assert_eq!(output.stdout_text(), "hello");
        assert_eq!(output.stderr, "oops");
    }

    #[tokio::test]
    async fn test_run_rejects_non_zero_exit() {
        let err = ToolCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "exit 1"])
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Failed { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_hung_tool() {
        let err = ToolCommand::new("sleep", Duration::from_millis(100))
            .arg("30")
            .output()
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = ToolCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "printf \"$MARKER:\"; pwd"])
            .env("MARKER", "set")
            .current_dir(dir.path())
            .run()
            .await
            .unwrap();

        let text = output.stdout_text();
        assert!(text.starts_with("set:"));
        assert!(text.trim_end().ends_with(&*dir.path().file_name().unwrap().to_string_lossy()));
    }

    #[test]
    fn test_display() {
        let command = ToolCommand::new("git", Duration::from_secs(1)).args(["log", "-5"]);
        assert_eq!(command.display(), "git log -5");
    }
}
