// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the print kiosk.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KioskError, Result};

/// Highest copy count a single job may request.
pub const MAX_COPIES: u32 = 100;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| KioskError::Validation(format!("invalid job id '{s}': {e}")))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a print job.
///
/// ```text
/// uploaded -> queued -> converting -> printing -> completed
///     \__________\___________\____________\-----> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    Queued,
    Converting,
    Printing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire / storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Converting => "converting",
            Self::Printing => "printing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "queued" => Some(Self::Queued),
            "converting" => Some(Self::Converting),
            "printing" => Some(Self::Printing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// No edges leave a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The transition table. `failed` is reachable from every non-terminal
    /// state; every other edge moves exactly one step forward.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (from, Self::Failed) => !from.is_terminal(),
            (Self::Uploaded, Self::Queued)
            | (Self::Queued, Self::Converting)
            | (Self::Converting, Self::Printing)
            | (Self::Printing, Self::Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported input document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    Pdf,
    Docx,
    Jpeg,
    Png,
}

impl DocumentType {
    pub const DOCX_MIME: &'static str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    /// Canonical MIME type string.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => Self::DOCX_MIME,
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// Resolve a declared MIME type. `image/jpg` is a common alias sent by
    /// browsers and is accepted as JPEG.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            Self::DOCX_MIME => Some(Self::Docx),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Infer document type from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

/// Standard paper sizes used for reflowed text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::Letter => (216, 279),
        }
    }
}

/// Colour handling requested for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Color,
    #[default]
    Bw,
}

/// One inclusive run of pages inside a [`PageRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

/// A page selection such as `"1-5, 8"`. Pages are 1-indexed and every span
/// satisfies `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageRange {
    spans: Vec<PageSpan>,
}

impl PageRange {
    pub fn parse(input: &str) -> Result<Self> {
        let mut spans = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (parse_page(a, input)?, parse_page(b, input)?),
                None => {
                    let page = parse_page(part, input)?;
                    (page, page)
                }
            };
            if start > end {
                return Err(KioskError::Validation(format!(
                    "page range '{input}': {start} is after {end}"
                )));
            }
            spans.push(PageSpan { start, end });
        }
        if spans.is_empty() {
            return Err(KioskError::Validation(format!(
                "page range '{input}' selects no pages"
            )));
        }
        Ok(Self { spans })
    }

    pub fn spans(&self) -> &[PageSpan] {
        &self.spans
    }
}

fn parse_page(raw: &str, whole: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(KioskError::Validation(format!(
            "page range '{whole}': '{}' is not a page number",
            raw.trim()
        ))),
        Ok(n) => Ok(n),
    }
}

impl fmt::Display for PageRange {
    /// Canonical form, e.g. `1-5,8` (the syntax `lp -o page-ranges` expects).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, span) in self.spans.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if span.start == span.end {
                write!(f, "{}", span.start)?;
            } else {
                write!(f, "{}-{}", span.start, span.end)?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for PageRange {
    type Error = KioskError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PageRange> for String {
    fn from(value: PageRange) -> Self {
        value.to_string()
    }
}

/// Print settings for a job. Immutable after intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintOptions {
    pub copies: u32,
    #[serde(default)]
    pub color_mode: ColorMode,
    #[serde(default)]
    pub page_range: Option<PageRange>,
}

impl PrintOptions {
    pub fn validate(&self) -> Result<()> {
        if self.copies == 0 || self.copies > MAX_COPIES {
            return Err(KioskError::Validation(format!(
                "copies must be between 1 and {MAX_COPIES}, got {}",
                self.copies
            )));
        }
        Ok(())
    }
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            copies: 1,
            color_mode: ColorMode::Bw,
            page_range: None,
        }
    }
}

/// One user-supplied file, as handed over by the upstream intake validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// Where the upload was saved.
    pub path: PathBuf,
    /// MIME type claimed for the file.
    pub declared_mime: String,
    /// Size in bytes as reported at upload time.
    pub size_bytes: u64,
}

impl InputFile {
    pub fn new(path: impl Into<PathBuf>, declared_mime: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            declared_mime: declared_mime.into(),
            size_bytes,
        }
    }
}

/// The instant a job entered a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: JobStatus,
    pub entered_at: DateTime<Utc>,
}

/// A complete print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub inputs: Vec<InputFile>,
    pub options: PrintOptions,
    pub status: JobStatus,
    /// Final print-ready PDF; set when the artifact is ready for dispatch.
    pub artifact_path: Option<PathBuf>,
    /// Failure cause; written once, together with the `failed` transition.
    pub error_detail: Option<String>,
    /// Statuses in the order they were entered. Append-only.
    pub timestamps: Vec<StatusEntry>,
}

impl Job {
    /// Build a freshly uploaded job.
    ///
    /// Rejects an empty input list and out-of-range print options; size
    /// and content-type checks belong to the orchestrator.
    pub fn new(inputs: Vec<InputFile>, options: PrintOptions) -> Result<Self> {
        if inputs.is_empty() {
            return Err(KioskError::Validation("a job needs at least one input".into()));
        }
        options.validate()?;

        Ok(Self {
            id: JobId::new(),
            inputs,
            options,
            status: JobStatus::Uploaded,
            artifact_path: None,
            error_detail: None,
            timestamps: vec![StatusEntry {
                status: JobStatus::Uploaded,
                entered_at: Utc::now(),
            }],
        })
    }

    /// When the job entered `status`, if it ever did.
    pub fn entered_at(&self, status: JobStatus) -> Option<DateTime<Utc>> {
        self.timestamps
            .iter()
            .find(|entry| entry.status == status)
            .map(|entry| entry.entered_at)
    }

    /// Statuses visited so far, in order.
    pub fn history(&self) -> Vec<JobStatus> {
        self.timestamps.iter().map(|entry| entry.status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_only_advance_one_step() {
        assert!(JobStatus::Uploaded.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Converting));
        assert!(JobStatus::Converting.can_transition_to(JobStatus::Printing));
        assert!(JobStatus::Printing.can_transition_to(JobStatus::Completed));

        assert!(!JobStatus::Uploaded.can_transition_to(JobStatus::Printing));
        assert!(!JobStatus::Printing.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn failed_reachable_from_every_non_terminal_state() {
        for status in [
            JobStatus::Uploaded,
            JobStatus::Queued,
            JobStatus::Converting,
            JobStatus::Printing,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed), "{status}");
        }
    }

    #[test]
    fn terminal_states_have_no_edges() {
        for from in [JobStatus::Completed, JobStatus::Failed] {
            for to in [
                JobStatus::Uploaded,
                JobStatus::Queued,
                JobStatus::Converting,
                JobStatus::Printing,
                JobStatus::Completed,
                JobStatus::Failed,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn mime_aliases_resolve() {
        assert_eq!(DocumentType::from_mime("image/jpg"), Some(DocumentType::Jpeg));
        assert_eq!(
            DocumentType::from_mime("application/pdf; charset=binary"),
            Some(DocumentType::Pdf)
        );
        assert_eq!(DocumentType::from_mime("application/msword"), None);
    }

    #[test]
    fn page_range_parses_and_normalises() {
        let range = PageRange::parse("1-5, 8").expect("parse");
        assert_eq!(range.spans().len(), 2);
        assert_eq!(range.to_string(), "1-5,8");
    }

    #[test]
    fn page_range_rejects_garbage() {
        assert!(PageRange::parse("").is_err());
        assert!(PageRange::parse("0").is_err());
        assert!(PageRange::parse("5-2").is_err());
        assert!(PageRange::parse("a-b").is_err());
    }

    #[test]
    fn print_options_serde_uses_page_range_string() {
        let json = r#"{"copies":2,"color_mode":"bw","page_range":"2-3"}"#;
        let options: PrintOptions = serde_json::from_str(json).expect("deserialize");
        assert_eq!(options.copies, 2);
        assert_eq!(options.page_range.expect("range").to_string(), "2-3");
    }

    #[test]
    fn job_requires_inputs_and_sane_copies() {
        assert!(Job::new(Vec::new(), PrintOptions::default()).is_err());

        let input = InputFile::new("/tmp/a.pdf", "application/pdf", 10);
        let too_many = PrintOptions {
            copies: MAX_COPIES + 1,
            ..Default::default()
        };
        assert!(Job::new(vec![input.clone()], too_many).is_err());

        let job = Job::new(vec![input], PrintOptions::default()).expect("job");
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.history(), vec![JobStatus::Uploaded]);
        assert!(job.artifact_path.is_none());
    }
}
