// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution for the kiosk runner.

use std::path::{Path, PathBuf};

use printkiosk_core::error::Result;

const APP_DIR: &str = "printkiosk";

/// Default configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "kiosk.json";

/// Return the kiosk data directory, creating it if needed.
pub fn data_dir() -> Result<PathBuf> {
    let dir = base_dir(
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
    .join(APP_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

fn base_dir(xdg_data_home: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(xdg) = xdg_data_home.filter(|p| p.is_absolute()) {
        return xdg;
    }
    if let Some(home) = home {
        return home.join(".local").join("share");
    }
    std::env::temp_dir()
}
