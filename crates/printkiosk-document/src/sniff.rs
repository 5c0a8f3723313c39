// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content sniffing — determine a file's type from its bytes, ignoring
// whatever the client claimed.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, instrument};

use printkiosk_core::error::Result;
use printkiosk_core::types::DocumentType;

/// Bytes read from the start of a file for sniffing.
const HEADER_LEN: usize = 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const PDF_MAGIC: &[u8] = b"%PDF-";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SOI: &[u8] = &[0xFF, 0xD8, 0xFF];
const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";

/// Main part every WordprocessingML package carries.
const DOCX_MAIN_PART: &str = "word/document.xml";

/// Classification of a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Document(DocumentType),
    /// A ZIP container. Only the package contents can tell DOCX apart from
    /// any other ZIP.
    Zip,
}

/// Classify a header slice.
pub fn sniff_bytes(header: &[u8]) -> Option<Sniffed> {
    if header.starts_with(PNG_SIGNATURE) {
        return Some(Sniffed::Document(DocumentType::Png));
    }
    if header.starts_with(JPEG_SOI) {
        return Some(Sniffed::Document(DocumentType::Jpeg));
    }
    if header.starts_with(ZIP_LOCAL_HEADER) {
        return Some(Sniffed::Zip);
    }
    if pdf_body(header).starts_with(PDF_MAGIC) {
        return Some(Sniffed::Document(DocumentType::Pdf));
    }
    None
}

/// The header with an optional byte-order mark and leading whitespace
/// removed. Nothing else may precede `%PDF-`.
fn pdf_body(header: &[u8]) -> &[u8] {
    let header = header.strip_prefix(UTF8_BOM).unwrap_or(header);
    let start = header
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(header.len());
    &header[start..]
}

/// Sniff a file on disk. Returns `None` when the content is not one of the
/// supported document types.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn sniff_file(path: impl AsRef<Path>) -> Result<Option<DocumentType>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    (&mut file)
        .take(HEADER_LEN as u64)
        .read_to_end(&mut header)?;

    let sniffed = match sniff_bytes(&header) {
        Some(Sniffed::Document(kind)) => Some(kind),
        Some(Sniffed::Zip) => {
            if is_docx_package(file) {
                Some(DocumentType::Docx)
            } else {
                None
            }
        }
        None => None,
    };

    debug!(?sniffed, header_len = header.len(), "content sniffed");
    Ok(sniffed)
}

fn is_docx_package(file: File) -> bool {
    match zip::ZipArchive::new(file) {
        Ok(mut archive) => archive.by_name(DOCX_MAIN_PART).is_ok(),
        Err(_) => false,
    }
}
