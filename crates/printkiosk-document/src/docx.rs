// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DOCX paragraph extraction for the text-only conversion tier.
//
// Reads `word/document.xml` out of the package and collects the text runs of
// each `w:p`. Images, tables layout, styles and headers are ignored.

use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, instrument};

use printkiosk_core::error::{KioskError, Result};

/// Extract the non-empty paragraphs of a DOCX file, in document order.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn extract_paragraphs(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        KioskError::Conversion(format!("{} is not a DOCX package: {e}", path.display()))
    })?;

    let xml = read_document_xml(&mut archive)?;
    let paragraphs = parse_paragraphs(&xml)?;
    debug!(paragraphs = paragraphs.len(), "DOCX text extracted");
    Ok(paragraphs)
}

fn read_document_xml<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<String> {
    let mut part = archive
        .by_name("word/document.xml")
        .map_err(|e| KioskError::Conversion(format!("missing word/document.xml: {e}")))?;

    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| KioskError::Conversion(format!("unreadable word/document.xml: {e}")))?;
    Ok(xml)
}

/// Walk WordprocessingML and return one string per non-blank paragraph.
fn parse_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => current.push(' '),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text => {
                let decoded = e.decode().map_err(|err| {
                    KioskError::Conversion(format!("bad text in document.xml: {err}"))
                })?;
                current.push_str(&decoded);
            }
            // `&amp;`, `&#233;` and friends arrive between text events.
            Ok(Event::GeneralRef(r)) if in_text => {
                let char_ref = r.resolve_char_ref().map_err(|err| {
                    KioskError::Conversion(format!("bad character reference in document.xml: {err}"))
                })?;
                match char_ref {
                    Some(ch) => current.push(ch),
                    None => {
                        let name = r.decode().map_err(|err| {
                            KioskError::Conversion(format!("bad entity in document.xml: {err}"))
                        })?;
                        match predefined_entity(&name) {
                            Some(ch) => current.push(ch),
                            None => {
                                current.push('&');
                                current.push_str(&name);
                                current.push(';');
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(KioskError::Conversion(format!(
                    "document.xml parse error at {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// The five entities every XML document may use without declaring them.
fn predefined_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}
