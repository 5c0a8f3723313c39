// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Windows backend. Printers are enumerated with `Get-Printer` and files are
// handed to the registered PDF handler through the shell's PrintTo verb,
// once per copy. The handler decides colour and page selection, so those
// options are not forwarded.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::ColorMode;

use crate::backend::{DispatchRequest, JobHandle, PrintBackend, choose_printer};
use crate::command;

const POWERSHELL: &str = "powershell";

const LIST_PRINTERS: &str = "Get-Printer | Select-Object -ExpandProperty Name";
const DEFAULT_PRINTER: &str =
    "Get-CimInstance -ClassName Win32_Printer -Filter 'Default=TRUE' | Select-Object -ExpandProperty Name";

#[derive(Debug, Clone)]
pub struct WindowsBackend {
    timeout: Duration,
}

impl WindowsBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn powershell(&self, script: &str) -> Result<command::CommandOutput> {
        command::run(
            POWERSHELL,
            ["-NoProfile", "-NonInteractive", "-Command", script],
            self.timeout,
        )
        .await
    }

    pub async fn default_printer(&self) -> Result<Option<String>> {
        let output = self.powershell(DEFAULT_PRINTER).await?;
        if !output.success {
            warn!(reason = %output.failure_reason(), "default printer query failed");
            return Ok(None);
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl PrintBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        let output = self.powershell(LIST_PRINTERS).await?;
        if !output.success {
            return Err(KioskError::PrintDispatch(format!(
                "Get-Printer: {}",
                output.failure_reason()
            )));
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip_all, fields(path = %request.path.display(), copies = request.copies))]
    async fn print_file(&self, request: &DispatchRequest) -> Result<JobHandle> {
        let printer = match request.printer.as_deref() {
            Some(name) => name.to_string(),
            None => {
                let default = self.default_printer().await?;
                let listed = if default.is_none() {
                    self.list_printers().await?
                } else {
                    Vec::new()
                };
                choose_printer(None, default, &listed)?
            }
        };

        if request.page_range.is_some() || request.color_mode == ColorMode::Bw {
            debug!(
                color_mode = ?request.color_mode,
                page_range = ?request.page_range,
                "PrintTo carries no colour or page options; left to the PDF handler"
            );
        }

        let script = print_to_script(&request.path, &printer);
        for copy in 1..=request.copies {
            let output = self.powershell(&script).await?;
            if !output.success {
                return Err(KioskError::PrintDispatch(format!(
                    "PrintTo failed for {printer} (copy {copy} of {}): {}",
                    request.copies,
                    output.failure_reason()
                )));
            }
        }

        info!(printer = %printer, copies = request.copies, "job handed to Windows shell");
        Ok(JobHandle {
            printer,
            spool_id: None,
            simulated: false,
        })
    }
}

/// PowerShell single-quoted literal.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Script that prints `path` to `printer` via the PrintTo verb.
pub fn print_to_script(path: &Path, printer: &str) -> String {
    let quoted_printer = format!("\"{printer}\"");
    format!(
        "Start-Process -FilePath {} -Verb PrintTo -ArgumentList {} -WindowStyle Hidden",
        ps_quote(&path.to_string_lossy()),
        ps_quote(&quoted_printer)
    )
}
