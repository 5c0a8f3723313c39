// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Order-preserving concatenation of PDFs into one artifact on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use printkiosk_core::error::{KioskError, Result};
use tracing::{info, instrument};

use super::reader::PdfReader;

/// Concatenates PDFs in the given order.
///
/// The output file either appears complete or not at all: pages are written
/// to a temporary file next to `output` and renamed into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfMerger;

impl PdfMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge `inputs` into `output`, returning the output path.
    ///
    /// Page count of the result equals the sum of the inputs' page counts,
    /// and page order follows input order.
    #[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
    pub fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<PathBuf> {
        let Some((first, rest)) = inputs.split_first() else {
            return Err(KioskError::Merge("nothing to merge".into()));
        };

        let mut merged = PdfReader::open(first)?;
        let mut expected_pages = merged.page_count();

        for path in rest {
            let next = PdfReader::open(path)?;
            expected_pages += next.page_count();
            merged.append(&next)?;
        }

        let actual_pages = merged.page_count();
        if actual_pages != expected_pages {
            return Err(KioskError::Merge(format!(
                "merged document has {actual_pages} pages, expected {expected_pages}"
            )));
        }

        let bytes = merged.to_bytes()?;
        write_atomically(output, &bytes)?;

        info!(pages = actual_pages, bytes = bytes.len(), "PDFs merged");
        Ok(output.to_path_buf())
    }
}

fn write_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".merge-")
        .suffix(".pdf")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(output)
        .map_err(|err| KioskError::Merge(format!("cannot move merged PDF into place: {err}")))?;
    Ok(())
}
