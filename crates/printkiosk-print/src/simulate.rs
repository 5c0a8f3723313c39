// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Simulate backend: accepts jobs after a fixed delay without touching any
// hardware. Handles it returns are always flagged `simulated`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument};

use printkiosk_core::error::{KioskError, Result};

use crate::backend::{DispatchRequest, JobHandle, PrintBackend};

const SIMULATED_PRINTER: &str = "simulated";

#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    delay: Duration,
}

impl SimulatedBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl PrintBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulate"
    }

    async fn list_printers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    #[instrument(skip_all, fields(path = %request.path.display()))]
    async fn print_file(&self, request: &DispatchRequest) -> Result<JobHandle> {
        // A real spooler would reject an unreadable file too.
        tokio::fs::metadata(&request.path).await.map_err(|e| {
            KioskError::PrintDispatch(format!("cannot read {}: {e}", request.path.display()))
        })?;

        tokio::time::sleep(self.delay).await;

        let printer = request
            .printer
            .clone()
            .unwrap_or_else(|| SIMULATED_PRINTER.to_string());
        info!(printer = %printer, copies = request.copies, "print simulated");
        Ok(JobHandle {
            printer,
            spool_id: None,
            simulated: true,
        })
    }
}
