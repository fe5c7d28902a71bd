//! External process seam
//!
//! Every adapter that shells out (terraform, aws, helm) goes through
//! [`CommandRunner`] so tests can assert the exact argv and feed canned
//! output back.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, trace};

use lakelab_common::{Error, Result};

/// A single process invocation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Binary name or path
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Start an invocation of `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Argv rendered for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured process output
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited zero
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Trait for executing external commands (allows mocking in tests)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output.
    ///
    /// A non-zero exit is not an error here; callers classify
    /// [`CommandOutput::success`]. Failing to spawn is.
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput>;

    /// Whether `tool` resolves on `PATH`
    async fn tool_available(&self, tool: &str) -> bool;
}

/// Runs commands with `tokio::process`
#[derive(Clone, Debug, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, invocation: Invocation) -> Result<CommandOutput> {
        debug!(cmd = %invocation.display(), "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                missing_tool(&invocation.program)
            } else {
                Error::Io(e)
            }
        })?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(cmd = %invocation.program, success = result.success, "finished");
        Ok(result)
    }

    async fn tool_available(&self, tool: &str) -> bool {
        Command::new("which")
            .arg(tool)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// `MissingTool` error with an install hint for known binaries
pub fn missing_tool(tool: &str) -> Error {
    let hint = match tool {
        "terraform" => "Install from https://developer.hashicorp.com/terraform/install",
        "aws" => "Install from https://aws.amazon.com/cli/",
        "helm" => "Install from https://helm.sh/docs/intro/install/",
        _ => "Install it and make sure it is on PATH",
    };
    Error::MissingTool {
        tool: tool.to_string(),
        hint: hint.to_string(),
    }
}

/// Fail with `MissingTool` for the first unavailable tool
pub async fn require_tools(runner: &dyn CommandRunner, tools: &[&str]) -> Result<()> {
    for tool in tools {
        if !runner.tool_available(tool).await {
            return Err(missing_tool(tool));
        }
    }
    Ok(())
}
