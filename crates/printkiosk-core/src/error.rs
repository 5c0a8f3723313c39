// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the print kiosk.

use thiserror::Error;

use crate::types::{JobId, JobStatus};

/// Top-level error type for all kiosk operations.
#[derive(Debug, Error)]
pub enum KioskError {
    // -- Intake --
    #[error("validation failed: {0}")]
    Validation(String),

    // -- Document errors --
    #[error("unsupported document type: {0}")]
    UnsupportedFormat(String),

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("PDF merge failed: {0}")]
    Merge(String),

    // -- Print errors --
    #[error("no printer available")]
    NoPrinterAvailable,

    #[error("print dispatch failed: {0}")]
    PrintDispatch(String),

    // -- Job lifecycle --
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    // -- Storage / persistence --
    #[error("document store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KioskError {
    /// Stable name of the error kind, used as the prefix of a failed job's
    /// error detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
            Self::Conversion(_) => "ConversionError",
            Self::Merge(_) => "MergeError",
            Self::NoPrinterAvailable => "NoPrinterAvailable",
            Self::PrintDispatch(_) => "PrintDispatchError",
            Self::IllegalTransition { .. } => "IllegalTransition",
            Self::JobNotFound(_) => "JobNotFound",
            Self::Store(_) => "StoreError",
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
        }
    }

    /// Human-readable failure cause recorded on a job: `"<kind>: <message>"`.
    pub fn job_detail(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KioskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_detail_names_the_kind() {
        let err = KioskError::Conversion("soffice exited with status 1".into());
        let detail = err.job_detail();
        assert!(detail.starts_with("ConversionError: "));
        assert!(detail.contains("soffice exited"));
    }

    #[test]
    fn no_printer_detail_is_non_empty() {
        assert_eq!(
            KioskError::NoPrinterAvailable.job_detail(),
            "NoPrinterAvailable: no printer available"
        );
    }
}
