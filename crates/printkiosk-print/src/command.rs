// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Run spooler command-line tools with a deadline.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use printkiosk_core::error::{KioskError, Result};

/// Captured result of a finished command.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` to completion. Failing to start it, or exceeding
/// `timeout`, is a dispatch error; a non-zero exit is reported in the
/// output for the caller to interpret.
pub(crate) async fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            KioskError::PrintDispatch(format!(
                "{program} timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| KioskError::PrintDispatch(format!("cannot run {program}: {e}")))?;

    let result = CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, code = ?result.code, "command finished");
    Ok(result)
}

impl CommandOutput {
    /// Best available explanation of a failure.
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}
