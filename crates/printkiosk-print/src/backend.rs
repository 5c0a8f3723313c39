// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print backend capability and start-up platform selection.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, instrument};

use printkiosk_core::config::{BackendChoice, PrintConfig};
use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{ColorMode, PageRange, PrintOptions};

use crate::cups::CupsBackend;
use crate::simulate::SimulatedBackend;
use crate::windows::WindowsBackend;

/// Everything a backend needs to spool one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub path: PathBuf,
    /// Target printer. `None` means the platform default.
    pub printer: Option<String>,
    pub copies: u32,
    pub color_mode: ColorMode,
    pub page_range: Option<PageRange>,
}

impl DispatchRequest {
    pub fn new(path: impl Into<PathBuf>, printer: Option<String>, options: &PrintOptions) -> Self {
        Self {
            path: path.into(),
            printer,
            copies: options.copies,
            color_mode: options.color_mode,
            page_range: options.page_range.clone(),
        }
    }
}

/// Receipt for a spool request the OS accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub printer: String,
    /// Spooler-assigned identifier, when the platform reports one.
    pub spool_id: Option<String>,
    /// True when nothing was sent to real hardware.
    pub simulated: bool,
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.spool_id, self.simulated) {
            (_, true) => write!(f, "{} (simulated)", self.printer),
            (Some(id), false) => write!(f, "{} [{id}]", self.printer),
            (None, false) => write!(f, "{}", self.printer),
        }
    }
}

/// Hardware-facing boundary to the OS print subsystem.
#[async_trait]
pub trait PrintBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Printers the OS knows about. May be empty.
    async fn list_printers(&self) -> Result<Vec<String>>;

    /// Spool `request.path`.
    ///
    /// Fails with `NoPrinterAvailable` when no printer was named and none
    /// can be resolved, and with `PrintDispatch` when the spooler rejects
    /// the job.
    async fn print_file(&self, request: &DispatchRequest) -> Result<JobHandle>;
}

/// Pick the printer for a job: the requested one, else the OS default,
/// else the first listed printer.
pub(crate) fn choose_printer(
    requested: Option<&str>,
    default: Option<String>,
    listed: &[String],
) -> Result<String> {
    if let Some(name) = requested {
        return Ok(name.to_string());
    }
    if let Some(name) = default {
        return Ok(name);
    }
    listed
        .first()
        .cloned()
        .ok_or(KioskError::NoPrinterAvailable)
}

/// Backend selected for this host.
#[derive(Debug, Clone)]
pub enum PlatformBackend {
    Cups(CupsBackend),
    Windows(WindowsBackend),
    Simulated(SimulatedBackend),
}

impl PlatformBackend {
    /// Choose the backend for the current platform and configuration.
    #[instrument(skip_all, fields(choice = ?config.backend))]
    pub fn detect(config: &PrintConfig) -> Self {
        let timeout = config.dispatch_timeout();
        let backend = match config.backend {
            BackendChoice::Simulate => Self::Simulated(SimulatedBackend::new(config.simulate_delay())),
            BackendChoice::Auto if cfg!(any(target_os = "linux", target_os = "macos")) => {
                Self::Cups(CupsBackend::new(timeout))
            }
            BackendChoice::Auto if cfg!(target_os = "windows") => {
                Self::Windows(WindowsBackend::new(timeout))
            }
            BackendChoice::Auto => Self::Simulated(SimulatedBackend::new(config.simulate_delay())),
        };
        info!(backend = backend.name(), "print backend selected");
        backend
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

#[async_trait]
impl PrintBackend for PlatformBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Cups(b) => b.name(),
            Self::Windows(b) => b.name(),
            Self::Simulated(b) => b.name(),
        }
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        match self {
            Self::Cups(b) => b.list_printers().await,
            Self::Windows(b) => b.list_printers().await,
            Self::Simulated(b) => b.list_printers().await,
        }
    }

    async fn print_file(&self, request: &DispatchRequest) -> Result<JobHandle> {
        match self {
            Self::Cups(b) => b.print_file(request).await,
            Self::Windows(b) => b.print_file(request).await,
            Self::Simulated(b) => b.print_file(request).await,
        }
    }
}
