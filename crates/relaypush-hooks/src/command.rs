//! Running a configured hook command

use std::process::Stdio;

use relaypush_core::prelude::*;
use tokio::process::Command;

/// What a finished hook reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stderr: String,
}

impl HookOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// One external command from the `[hooks]` config section
#[derive(Debug, Clone)]
pub struct HookCommand {
    name: String,
    program: String,
    args: Vec<String>,
}

impl HookCommand {
    /// Build from an argv array; an empty array or program is not configured
    pub fn from_argv(name: &str, argv: &[String]) -> Result<Self> {
        match argv.split_first() {
            Some((program, args)) if !program.trim().is_empty() => Ok(Self {
                name: name.to_string(),
                program: program.clone(),
                args: args.to_vec(),
            }),
            _ => Err(Error::hook_not_configured(name)),
        }
    }

    /// Run to completion with `env` added to the inherited environment
    ///
    /// stdin is closed; stdout and stderr are captured and logged at debug.
    /// Only a failure to start the process is an error.
    pub async fn run(&self, env: &[(&str, &str)]) -> Result<HookOutput> {
        debug!(hook = %self.name, "Running {} {}", self.program, self.args.join(" "));

        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::hook_spawn(&self.name, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            debug!(hook = %self.name, "stdout: {}", line);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            debug!(hook = %self.name, "stderr: {}", stderr);
        }

        let code = output.status.code();
        debug!(hook = %self.name, ?code, "Hook finished");
        Ok(HookOutput { code, stderr })
    }
}
