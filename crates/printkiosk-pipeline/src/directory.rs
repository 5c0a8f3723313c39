// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optional printer directory. When present, its first entry is the printer
// jobs are sent to; when absent, the backend's OS default is used.

use async_trait::async_trait;

use printkiosk_core::error::Result;

#[async_trait]
pub trait PrinterDirectory: Send + Sync {
    /// Resolvable printer names, most preferred first.
    async fn printers(&self) -> Result<Vec<String>>;
}

/// A fixed list, typically taken from kiosk configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    printers: Vec<String>,
}

impl StaticDirectory {
    pub fn new(printers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            printers: printers.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PrinterDirectory for StaticDirectory {
    async fn printers(&self) -> Result<Vec<String>> {
        Ok(self.printers.clone())
    }
}
