// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kiosk configuration. Every field has a default so a partial (or missing)
// config file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KioskError, Result};

/// Default per-file upload limit (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Persistent kiosk settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub intake: IntakeConfig,
    pub conversion: ConversionConfig,
    pub print: PrintConfig,
    pub storage: StorageConfig,
    pub broadcast: BroadcastConfig,
}

impl KioskConfig {
    /// Load settings from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data)
            .map_err(|e| KioskError::Config(format!("{}: {e}", path.display())))
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Point every directory setting at subdirectories of `root`.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.conversion.scratch_dir = root.join("scratch");
        self.storage.artifact_dir = root.join("artifacts");
        self
    }
}

/// Limits applied before a job enters the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub max_file_size_bytes: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Format converter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Where per-input intermediate PDFs are written.
    pub scratch_dir: PathBuf,
    /// LibreOffice executable used for full-fidelity DOCX rendering.
    pub office_binary: PathBuf,
    /// Probe for the office renderer at start-up. When false (or the probe
    /// fails) DOCX files use the text-only fallback.
    pub prefer_native_renderer: bool,
    pub timeout_secs: u64,
    /// Convert the inputs of one job concurrently.
    pub parallel: bool,
    /// Resolution at which raster images are placed on their page.
    pub image_dpi: f32,
}

impl ConversionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("printkiosk").join("scratch"),
            office_binary: PathBuf::from("soffice"),
            prefer_native_renderer: true,
            timeout_secs: 120,
            parallel: false,
            image_dpi: 100.0,
        }
    }
}

/// Which print backend to construct at start-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    /// Native backend for the host platform, simulate where none exists.
    #[default]
    Auto,
    /// Always simulate, even where a native spooler is available.
    Simulate,
}

/// Print dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub backend: BackendChoice,
    /// Fixed target printer. `None` uses the OS default.
    pub printer_name: Option<String>,
    pub dispatch_timeout_secs: u64,
    /// How long the simulate backend pretends to spool.
    pub simulate_delay_ms: u64,
    /// When true, `submit` returns only after the job is terminal. When
    /// false the pipeline runs on a background task and observers follow
    /// progress through the broadcaster.
    pub synchronous_dispatch: bool,
}

impl PrintConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn simulate_delay(&self) -> Duration {
        Duration::from_millis(self.simulate_delay_ms)
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            printer_name: None,
            dispatch_timeout_secs: 60,
            simulate_delay_ms: 2000,
            synchronous_dispatch: true,
        }
    }
}

/// Job records and final artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub artifact_dir: PathBuf,
    /// SQLite database for job records; in-memory when unset.
    pub database_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join("printkiosk").join("artifacts"),
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Events buffered per observer before further events to it are dropped.
    pub subscriber_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 64,
        }
    }
}
