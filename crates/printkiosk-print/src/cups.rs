// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS backend for Linux and macOS, driven through the `lp` and `lpstat`
// command-line clients.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::ColorMode;

use crate::backend::{DispatchRequest, JobHandle, PrintBackend, choose_printer};
use crate::command;

/// Title shown in the CUPS queue for every kiosk job.
const JOB_TITLE: &str = "Kiosk Print Job";

#[derive(Debug, Clone)]
pub struct CupsBackend {
    timeout: Duration,
}

impl CupsBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The system default destination, if one is configured.
    pub async fn default_printer(&self) -> Result<Option<String>> {
        let output = command::run("lpstat", ["-d"], self.timeout).await?;
        if !output.success {
            warn!(reason = %output.failure_reason(), "lpstat -d failed");
            return Ok(None);
        }
        Ok(parse_default_printer(&output.stdout))
    }
}

#[async_trait]
impl PrintBackend for CupsBackend {
    fn name(&self) -> &'static str {
        "cups"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        let output = command::run("lpstat", ["-e"], self.timeout).await?;
        if !output.success {
            // lpstat exits non-zero when no destinations exist at all.
            if output.stderr.contains("No destinations") {
                return Ok(Vec::new());
            }
            return Err(KioskError::PrintDispatch(format!(
                "lpstat -e: {}",
                output.failure_reason()
            )));
        }
        Ok(parse_printer_list(&output.stdout))
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

        let args = lp_args(&printer, request);
        let output = command::run("lp", &args, self.timeout).await?;
        if !output.success {
            return Err(KioskError::PrintDispatch(format!(
                "lp rejected the job for {printer}: {}",
                output.failure_reason()
            )));
        }

        let spool_id = parse_request_id(&output.stdout);
        info!(printer = %printer, spool_id = ?spool_id, "job accepted by CUPS");
        Ok(JobHandle {
            printer,
            spool_id,
            simulated: false,
        })
    }
}

/// Arguments for `lp`, ending with the file to print.
pub fn lp_args(printer: &str, request: &DispatchRequest) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        printer.to_string(),
        "-n".to_string(),
        request.copies.to_string(),
        "-t".to_string(),
        JOB_TITLE.to_string(),
    ];
    if let Some(range) = &request.page_range {
        args.push("-o".to_string());
        args.push(format!("page-ranges={range}"));
    }
    if request.color_mode == ColorMode::Bw {
        args.push("-o".to_string());
        args.push("print-color-mode=monochrome".to_string());
    }
    args.push(path_arg(&request.path));
    args
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parse `lpstat -d` output: `system default destination: NAME`.
pub fn parse_default_printer(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        let (label, name) = line.split_once(':')?;
        if !label.contains("default destination") {
            return None;
        }
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// Parse `lpstat -e` output: one destination per line.
pub fn parse_printer_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `lp` output: `request id is NAME-42 (1 file(s))`.
pub fn parse_request_id(stdout: &str) -> Option<String> {
    let rest = stdout.split_once("request id is ")?.1;
    rest.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printkiosk_core::types::{PageRange, PrintOptions};

    #[test]
    fn default_printer_is_parsed() {
        assert_eq!(
            parse_default_printer("system default destination: Lobby_Laser\n"),
            Some("Lobby_Laser".to_string())
        );
        assert_eq!(parse_default_printer("no system default destination\n"), None);
        assert_eq!(parse_default_printer(""), None);
    }

    #[test]
    fn printer_list_skips_blank_lines() {
        assert_eq!(
            parse_printer_list("Lobby_Laser\n\nBack_Office_Inkjet\n"),
            vec!["Lobby_Laser".to_string(), "Back_Office_Inkjet".to_string()]
        );
        assert!(parse_printer_list("").is_empty());
    }

    #[test]
    fn request_id_is_parsed() {
        assert_eq!(
            parse_request_id("request id is Lobby_Laser-42 (1 file(s))\n"),
            Some("Lobby_Laser-42".to_string())
        );
        assert_eq!(parse_request_id("something else"), None);
    }

    #[test]
    fn lp_args_carry_options() {
        let options = PrintOptions {
            copies: 3,
            color_mode: ColorMode::Bw,
            page_range: Some(PageRange::parse("1-2, 5").expect("range")),
        };
        let request = DispatchRequest::new("/tmp/job.pdf", None, &options);
        let args = lp_args("Lobby", &request);

        assert_eq!(
            args,
            vec![
                "-d",
                "Lobby",
                "-n",
                "3",
                "-t",
                "Kiosk Print Job",
                "-o",
                "page-ranges=1-2,5",
                "-o",
                "print-color-mode=monochrome",
                "/tmp/job.pdf",
            ]
        );
    }

    #[test]
    fn colour_jobs_request_no_monochrome() {
        let options = PrintOptions {
            copies: 1,
            color_mode: ColorMode::Color,
            page_range: None,
        };
        let request = DispatchRequest::new("/tmp/job.pdf", None, &options);
        let args = lp_args("Lobby", &request);
        assert!(!args.iter().any(|a| a.contains("monochrome")));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/job.pdf"));
    }
}
