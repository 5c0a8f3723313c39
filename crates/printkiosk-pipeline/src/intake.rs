// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input validation run before a job is queued: size limit and content
// sniffing against the declared type.

use std::path::Path;

use tracing::debug;

use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::{DocumentType, InputFile};
use printkiosk_document::sniff_file;

/// Check every input of a job. Blocking: reads the head of each file.
pub fn validate_inputs(inputs: &[InputFile], max_size_bytes: u64) -> Result<()> {
    for (index, input) in inputs.iter().enumerate() {
        validate_one(index, input, max_size_bytes)?;
    }
    Ok(())
}

fn validate_one(index: usize, input: &InputFile, max_size_bytes: u64) -> Result<()> {
    let name = display_name(&input.path);

    let declared = DocumentType::from_mime(&input.declared_mime)
        .ok_or_else(|| KioskError::UnsupportedFormat(input.declared_mime.clone()))?;

    let actual_size = std::fs::metadata(&input.path)
        .map_err(|e| KioskError::Validation(format!("input {index} ({name}) unreadable: {e}")))?
        .len();
    let size = input.size_bytes.max(actual_size);
    if size > max_size_bytes {
        return Err(KioskError::Validation(format!(
            "input {index} ({name}) is {size} bytes, limit is {max_size_bytes}"
        )));
    }

    match sniff_file(&input.path)? {
        Some(sniffed) if sniffed == declared => {
            debug!(index, document_type = ?sniffed, size, "input accepted");
            Ok(())
        }
        Some(sniffed) => Err(KioskError::Validation(format!(
            "input {index} ({name}) declared {} but content is {}",
            declared.mime_type(),
            sniffed.mime_type()
        ))),
        None => Err(KioskError::Validation(format!(
            "input {index} ({name}) content is not PDF, DOCX, JPEG or PNG"
        ))),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_HEAD: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";
    const PNG_HEAD: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> InputFile {
        let path = dir.join(name);
        std::fs::write(&path, bytes).expect("write");
        InputFile::new(path, "application/pdf", bytes.len() as u64)
    }

    #[test]
    fn matching_content_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write(dir.path(), "a.pdf", PDF_HEAD);
        validate_inputs(&[input], 1024).expect("valid");
    }

    #[test]
    fn oversized_input_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write(dir.path(), "a.pdf", PDF_HEAD);
        assert!(matches!(
            validate_inputs(&[input], 4),
            Err(KioskError::Validation(_))
        ));
    }

    #[test]
    fn understated_size_is_caught_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut input = write(dir.path(), "a.pdf", PDF_HEAD);
        input.size_bytes = 1;
        assert!(validate_inputs(&[input], 8).is_err());
    }

    #[test]
    fn mismatched_content_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = write(dir.path(), "photo.pdf", PNG_HEAD);
        let err = validate_inputs(&[input], 1024).expect_err("mismatch");
        assert_eq!(err.kind(), "ValidationError");
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn undeclarable_type_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut input = write(dir.path(), "notes.txt", b"hello");
        input.declared_mime = "text/plain".into();
        assert!(matches!(
            validate_inputs(&[input], 1024),
            Err(KioskError::UnsupportedFormat(_))
        ));
    }
}
