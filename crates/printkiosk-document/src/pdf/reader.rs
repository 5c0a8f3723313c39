// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — open existing documents and append pages from one to another
// using the `lopdf` crate.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use printkiosk_core::error::{KioskError, Result};
use tracing::{debug, instrument, warn};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against malformed page trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Reads and combines existing PDF files.
///
/// Wraps `lopdf::Document`. Every error is reported as a merge failure since
/// reading existing PDFs only happens while assembling a job's artifact.
#[derive(Clone)]
pub struct PdfReader {
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem. A document without pages is rejected.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            KioskError::Merge(format!("failed to open {}: {err}", path_ref.display()))
        })?;

        let reader = Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        };
        reader.ensure_has_pages()?;
        debug!(pages = reader.page_count(), "PDF loaded");
        Ok(reader)
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data)
            .map_err(|err| KioskError::Merge(format!("failed to load PDF from memory: {err}")))?;

        let reader = Self {
            document,
            source_path: None,
        };
        reader.ensure_has_pages()?;
        Ok(reader)
    }

    fn ensure_has_pages(&self) -> Result<()> {
        if self.page_count() == 0 {
            return Err(KioskError::Merge(format!(
                "{} has no pages",
                self.source_path.as_deref().unwrap_or("PDF")
            )));
        }
        Ok(())
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Decoded content stream of a page (1-indexed).
    pub fn page_content(&self, page_number: u32) -> Result<Vec<u8>> {
        let pages = self.document.get_pages();
        let page_id = *pages.get(&page_number).ok_or_else(|| {
            KioskError::Merge(format!(
                "page {page_number} out of range (document has {} pages)",
                pages.len()
            ))
        })?;
        self.document
            .get_page_content(page_id)
            .map_err(|err| KioskError::Merge(format!("cannot read page {page_number}: {err}")))
    }

    // -- Combination ----------------------------------------------------------

    /// Append every page of `other`, in order, after this document's pages.
    #[instrument(skip_all, fields(base_pages = self.page_count(), other_pages = other.page_count()))]
    pub fn append(&mut self, other: &PdfReader) -> Result<()> {
        let pages_id = page_tree_root(&self.document)?;

        let mut cloner = ObjectCloner::new(&other.document);
        for (_, page_id) in other.document.get_pages() {
            let cloned = cloner.clone_page(&mut self.document, page_id)?;
            attach_page(&mut self.document, pages_id, cloned)?;
        }

        debug!(pages = self.page_count(), "pages appended");
        Ok(())
    }

    /// Serialise the document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.write_to(&mut output)?;
        Ok(output)
    }

    pub fn write_to<W: Write>(&mut self, target: &mut W) -> Result<()> {
        self.document
            .save_to(target)
            .map_err(|err| KioskError::Merge(format!("failed to serialise PDF: {err}")))
    }
}

fn page_tree_root(document: &Document) -> Result<ObjectId> {
    document
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|err| KioskError::Merge(format!("document has no page tree: {err}")))
}

/// Hang `page_id` off the root /Pages node and bump its /Count.
fn attach_page(target: &mut Document, pages_id: ObjectId, page_id: ObjectId) -> Result<()> {
    let pages_dict = target
        .get_dictionary_mut(pages_id)
        .map_err(|err| KioskError::Merge(format!("page tree root unreadable: {err}")))?;

    let mut kids = pages_dict
        .get(b"Kids")
        .and_then(Object::as_array)
        .cloned()
        .unwrap_or_default();
    kids.push(Object::Reference(page_id));
    pages_dict.set("Kids", Object::Array(kids));

    let count = pages_dict
        .get(b"Count")
        .and_then(Object::as_i64)
        .unwrap_or(0);
    pages_dict.set("Count", Object::Integer(count + 1));

    let page = target
        .get_dictionary_mut(page_id)
        .map_err(|err| KioskError::Merge(format!("cloned page unreadable: {err}")))?;
    page.set("Parent", Object::Reference(pages_id));
    Ok(())
}

/// Copies objects from one document into another.
///
/// Each source object is copied at most once: the target id is reserved
/// before descending, so shared resources stay shared and reference cycles
/// terminate.
struct ObjectCloner<'a> {
    source: &'a Document,
    copied: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCloner<'a> {
    fn new(source: &'a Document) -> Self {
        Self {
            source,
            copied: HashMap::new(),
        }
    }

    /// Clone a page, materialising attributes it inherits from the source
    /// page tree. /Parent is left for the caller to set.
    fn clone_page(&mut self, target: &mut Document, page_id: ObjectId) -> Result<ObjectId> {
        let source = self.source;
        let page = source.get_dictionary(page_id).map_err(|err| {
            KioskError::Merge(format!("cannot read page object {page_id:?}: {err}"))
        })?;

        let new_id = target.new_object_id();
        self.copied.insert(page_id, new_id);

        let mut flattened = page.clone();
        for key in INHERITABLE_KEYS {
            if flattened.has(key) {
                continue;
            }
            if let Some(value) = self.inherited(page, key) {
                flattened.set(key.to_vec(), value);
            }
        }

        let cloned = self.clone_dictionary(target, &flattened)?;
        target.objects.insert(new_id, Object::Dictionary(cloned));
        Ok(new_id)
    }

    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        let mut depth = 0;
        while let Some(id) = parent {
            if depth >= MAX_TREE_DEPTH {
                warn!(?id, "page tree deeper than expected; giving up inheritance lookup");
                return None;
            }
            let node = self.source.get_dictionary(id).ok()?;
            if let Ok(value) = node.get(key) {
                return Some(value.clone());
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
            depth += 1;
        }
        None
    }

    fn clone_reference(&mut self, target: &mut Document, id: ObjectId) -> Result<Object> {
        if let Some(&existing) = self.copied.get(&id) {
            return Ok(Object::Reference(existing));
        }

        let source = self.source;
        let referenced = match source.get_object(id) {
            Ok(object) => object,
            Err(err) => {
                warn!(?id, %err, "cannot resolve reference, using Null");
                return Ok(Object::Null);
            }
        };

        let new_id = target.new_object_id();
        self.copied.insert(id, new_id);
        let cloned = self.clone_object(target, referenced)?;
        target.objects.insert(new_id, cloned);
        Ok(Object::Reference(new_id))
    }

    fn clone_object(&mut self, target: &mut Document, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.clone_reference(target, *id),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.clone_dictionary(target, dict)?)),
            Object::Array(items) => {
                let mut cloned = Vec::with_capacity(items.len());
                for item in items {
                    cloned.push(self.clone_object(target, item)?);
                }
                Ok(Object::Array(cloned))
            }
            Object::Stream(stream) => {
                let dict = self.clone_dictionary(target, &stream.dict)?;
                let mut cloned = Stream::new(dict, stream.content.clone());
                cloned.allows_compression = stream.allows_compression;
                Ok(Object::Stream(cloned))
            }
            other => Ok(other.clone()),
        }
    }

    /// Clone a dictionary. Page-tree /Parent links are dropped so copying a
    /// page never drags in the rest of the source tree.
    fn clone_dictionary(&mut self, target: &mut Document, dict: &Dictionary) -> Result<Dictionary> {
        let is_tree_node = matches!(
            dict.get(b"Type").and_then(Object::as_name),
            Ok(b"Page") | Ok(b"Pages")
        );

        let mut cloned = Dictionary::new();
        for (key, value) in dict.iter() {
            if is_tree_node && key.as_slice() == b"Parent" {
                continue;
            }
            cloned.set(key.clone(), self.clone_object(target, value)?);
        }
        Ok(cloned)
    }
}
