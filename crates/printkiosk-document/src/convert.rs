// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Format conversion — every accepted upload becomes exactly one PDF.
//
// PDFs pass through untouched. Raster images become a single page sized to
// the image. DOCX goes through the word renderer chosen at start-up: headless
// LibreOffice when it answers the probe, otherwise a text-only rebuild of the
// document's paragraphs, reported as degraded.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use image::{DynamicImage, RgbImage};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use printkiosk_core::config::ConversionConfig;
use printkiosk_core::error::{KioskError, Result};
use printkiosk_core::types::DocumentType;

use crate::docx;
use crate::pdf::writer::PdfWriter;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fidelity of DOCX rendering available on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererTier {
    /// Full layout, images and styling.
    Native,
    /// Paragraph text only.
    TextOnly,
}

/// Outcome of converting one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub source: PathBuf,
    pub pdf_path: PathBuf,
    pub document_type: DocumentType,
    /// Formatting and embedded images were lost. Not an error.
    pub degraded: bool,
    /// `pdf_path` is a new file owned by the caller. False when the input
    /// was already a PDF and `pdf_path` is the input itself.
    pub created: bool,
}

/// Headless LibreOffice, driven through `--convert-to pdf`.
#[derive(Debug, Clone)]
pub struct OfficeRenderer {
    binary: PathBuf,
}

impl OfficeRenderer {
    /// Check that `binary` runs. Returns `None` when it is missing, fails or
    /// hangs.
    #[instrument(skip_all, fields(binary = %binary.as_ref().display()))]
    pub async fn probe(binary: impl AsRef<Path>) -> Option<Self> {
        let binary = binary.as_ref().to_path_buf();
        let mut cmd = Command::new(&binary);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!(version = %version.trim(), "office renderer available");
                Some(Self { binary })
            }
            Ok(Ok(output)) => {
                warn!(status = %output.status, "office renderer probe failed");
                None
            }
            Ok(Err(err)) => {
                debug!(%err, "office renderer not installed");
                None
            }
            Err(_) => {
                warn!("office renderer probe timed out");
                None
            }
        }
    }

    /// Render `input` to a PDF inside `scratch_dir`.
    ///
    /// Each run gets a private profile directory so concurrent conversions
    /// do not contend for LibreOffice's user installation lock.
    async fn render(&self, input: &Path, scratch_dir: &Path, timeout: Duration) -> Result<PathBuf> {
        let workdir = tempfile::Builder::new()
            .prefix(".office-")
            .tempdir_in(scratch_dir)?;
        let outdir = workdir.path().join("out");
        let profile = workdir.path().join("profile");
        tokio::fs::create_dir_all(&outdir).await?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless")
            .arg("--norestore")
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&outdir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(KioskError::Conversion(format!(
                    "cannot run {}: {err}",
                    self.binary.display()
                )));
            }
            Err(_) => {
                return Err(KioskError::Conversion(format!(
                    "office render timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KioskError::Conversion(format!(
                "office render exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stem = input
            .file_stem()
            .ok_or_else(|| KioskError::Conversion(format!("{} has no file name", input.display())))?;
        let rendered = outdir.join(format!("{}.pdf", stem.to_string_lossy()));
        if !rendered.exists() {
            return Err(KioskError::Conversion(format!(
                "office render produced no PDF for {}",
                input.display()
            )));
        }

        let target = scratch_pdf_path(scratch_dir);
        tokio::fs::rename(&rendered, &target).await?;
        Ok(target)
    }
}

/// Renderer used for DOCX inputs, fixed at start-up.
#[derive(Debug, Clone)]
pub enum WordRenderer {
    Office(OfficeRenderer),
    TextOnly,
}

impl WordRenderer {
    pub fn tier(&self) -> RendererTier {
        match self {
            Self::Office(_) => RendererTier::Native,
            Self::TextOnly => RendererTier::TextOnly,
        }
    }
}

/// Converts accepted uploads into PDFs in the scratch directory.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    scratch_dir: PathBuf,
    timeout: Duration,
    image_dpi: f32,
    word: WordRenderer,
}

impl FormatConverter {
    /// Build a converter, probing for the office renderer when the
    /// configuration prefers it.
    pub async fn probe(config: &ConversionConfig) -> Self {
        let word = if config.prefer_native_renderer {
            match OfficeRenderer::probe(&config.office_binary).await {
                Some(renderer) => WordRenderer::Office(renderer),
                None => WordRenderer::TextOnly,
            }
        } else {
            WordRenderer::TextOnly
        };
        info!(tier = ?word.tier(), "format converter ready");
        Self::new(config, word)
    }

    pub fn new(config: &ConversionConfig, word: WordRenderer) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            timeout: config.timeout(),
            image_dpi: config.image_dpi,
            word,
        }
    }

    pub fn tier(&self) -> RendererTier {
        self.word.tier()
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Convert `input`, declared as `mime`, into a PDF.
    ///
    /// On error no output file is left behind.
    #[instrument(skip(self, input), fields(input = %input.display()))]
    pub async fn convert(&self, input: &Path, mime: &str) -> Result<Conversion> {
        let document_type = DocumentType::from_mime(mime)
            .ok_or_else(|| KioskError::UnsupportedFormat(mime.to_string()))?;

        if document_type == DocumentType::Pdf {
            debug!("PDF input passes through");
            return Ok(Conversion {
                source: input.to_path_buf(),
                pdf_path: input.to_path_buf(),
                document_type,
                degraded: false,
                created: false,
            });
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let (pdf_path, degraded) = match (document_type, &self.word) {
            (DocumentType::Docx, WordRenderer::Office(office)) => {
                let path = office.render(input, &self.scratch_dir, self.timeout).await?;
                (path, false)
            }
            (DocumentType::Docx, WordRenderer::TextOnly) => {
                let source = input.to_path_buf();
                let bytes = self.run_blocking(move || render_docx_text(&source)).await?;
                (self.write_scratch(&bytes).await?, true)
            }
            (kind, _) if kind.is_image() => {
                let source = input.to_path_buf();
                let dpi = self.image_dpi;
                let bytes = self.run_blocking(move || render_image(&source, dpi)).await?;
                (self.write_scratch(&bytes).await?, false)
            }
            (kind, _) => return Err(KioskError::UnsupportedFormat(kind.mime_type().to_string())),
        };

        info!(
            document_type = ?document_type,
            output = %pdf_path.display(),
            degraded,
            "input converted"
        );

        Ok(Conversion {
            source: input.to_path_buf(),
            pdf_path,
            document_type,
            degraded,
            created: true,
        })
    }

    /// Run CPU-bound rendering off the async workers, bounded by the
    /// conversion timeout.
    async fn run_blocking<F>(&self, work: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(KioskError::Conversion(format!(
                "conversion task failed: {join_err}"
            ))),
            Err(_) => Err(KioskError::Conversion(format!(
                "conversion timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn write_scratch(&self, bytes: &[u8]) -> Result<PathBuf> {
        let path = scratch_pdf_path(&self.scratch_dir);
        if let Err(err) = tokio::fs::write(&path, bytes).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(err.into());
        }
        Ok(path)
    }
}

fn scratch_pdf_path(scratch_dir: &Path) -> PathBuf {
    scratch_dir.join(format!("{}.pdf", Uuid::new_v4()))
}

fn render_docx_text(path: &Path) -> Result<Vec<u8>> {
    let paragraphs = docx::extract_paragraphs(path)?;
    let mut writer = PdfWriter::letter();
    if let Some(name) = path.file_stem() {
        writer.set_title(name.to_string_lossy());
    }
    writer.create_from_text(&paragraphs.join("\n\n"))
}

fn render_image(path: &Path, dpi: f32) -> Result<Vec<u8>> {
    let data = std::fs::read(path)?;
    let decoded = image::load_from_memory(&data).map_err(|err| {
        KioskError::Conversion(format!("cannot decode image {}: {err}", path.display()))
    })?;
    let flattened = flatten_onto_white(&decoded);
    PdfWriter::letter().create_from_image(&flattened, dpi)
}

/// Composite any transparency over a white background.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
