// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer — create new PDF documents from text or images using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use image::RgbImage;
use printkiosk_core::PaperSize;
use printkiosk_core::error::{KioskError, Result};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    RawImageData, RawImageFormat, TextItem, XObjectTransform,
};
use tracing::{debug, info, instrument};

const MM_PER_INCH: f32 = 25.4;

/// Creates new PDF documents from text content or raster images.
pub struct PdfWriter {
    /// Paper size for reflowed text pages.
    paper_size: PaperSize,
    /// Title metadata embedded in the PDF /Info dictionary.
    title: Option<String>,
}

impl PdfWriter {
    pub fn new(paper_size: PaperSize) -> Self {
        Self {
            paper_size,
            title: None,
        }
    }

    /// Letter-sized pages, the layout documents reflowed from DOCX use.
    pub fn letter() -> Self {
        Self::new(PaperSize::Letter)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    fn page_dimensions(&self) -> (Mm, Mm) {
        let (w_mm, h_mm) = self.paper_size.dimensions_mm();
        (Mm(w_mm as f32), Mm(h_mm as f32))
    }

    // -- Text to PDF ----------------------------------------------------------

    /// Lay plain text onto as many pages as it needs.
    ///
    /// Paragraphs are separated by blank lines in `text`. Long lines wrap at
    /// an estimated Helvetica glyph width. Empty input still yields one blank
    /// page so the result is always a printable document.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn create_from_text(&self, text: &str) -> Result<Vec<u8>> {
        let (page_w, page_h) = self.page_dimensions();
        let title = self.title.as_deref().unwrap_or("Kiosk Document");

        let font_size_pt: f32 = 11.0;
        let line_height_pt: f32 = 14.0;
        let margin_mm: f32 = 20.0;
        let margin_pt: f32 = Mm(margin_mm).into_pt().0;
        let usable_width_mm = page_w.0 - 2.0 * margin_mm;

        // Average Helvetica glyph is about half the font size wide.
        let avg_char_width_mm: f32 = 0.50 * font_size_pt * 0.3528;
        let max_chars_per_line = ((usable_width_mm / avg_char_width_mm) as usize).max(1);

        let lines = wrap_text(text, max_chars_per_line);
        let page_h_pt = page_h.into_pt().0;
        let lines_per_page = (((page_h_pt - 2.0 * margin_pt) / line_height_pt) as usize).max(1);

        let mut pages: Vec<PdfPage> = lines
            .chunks(lines_per_page)
            .map(|chunk| {
                let mut ops: Vec<Op> = Vec::with_capacity(chunk.len() * 5);
                for (line_idx, line) in chunk.iter().enumerate() {
                    if line.is_empty() {
                        continue;
                    }
                    let y_pt = page_h_pt - margin_pt - (line_idx as f32 * line_height_pt);
                    ops.push(Op::StartTextSection);
                    ops.push(Op::SetTextCursor {
                        pos: Point {
                            x: Pt(margin_pt),
                            y: Pt(y_pt),
                        },
                    });
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(font_size_pt),
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(line.clone())],
                        font: BuiltinFont::Helvetica,
                    });
                    ops.push(Op::EndTextSection);
                }
                PdfPage::new(page_w, page_h, ops)
            })
            .collect();

        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }

        info!(paper = ?self.paper_size, lines = lines.len(), pages = pages.len(), "text laid out");

        let mut doc = PdfDocument::new(title);
        doc.with_pages(pages);
        Ok(save(&doc))
    }

    // -- Image to PDF ---------------------------------------------------------

    /// Create a single-page PDF whose page is exactly the size of `image`
    /// rendered at `dpi`.
    ///
    /// The caller is responsible for flattening transparency; the image is
    /// embedded as opaque RGB.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn create_from_image(&self, image: &RgbImage, dpi: f32) -> Result<Vec<u8>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(KioskError::Conversion("image has no pixels".into()));
        }
        if !(dpi.is_finite() && dpi > 0.0) {
            return Err(KioskError::Conversion(format!("invalid image dpi {dpi}")));
        }

        let title = self.title.as_deref().unwrap_or("Kiosk Image");
        let width = image.width() as usize;
        let height = image.height() as usize;

        let raw = RawImage {
            pixels: RawImageData::U8(image.as_raw().clone()),
            width,
            height,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };

        let mut doc = PdfDocument::new(title);
        let xobject_id = doc.add_image(&raw);

        let page_w = Mm(width as f32 / dpi * MM_PER_INCH);
        let page_h = Mm(height as f32 / dpi * MM_PER_INCH);

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(dpi),
                rotate: None,
            },
        }];

        doc.with_pages(vec![PdfPage::new(page_w, page_h, ops)]);
        debug!(page_w_mm = page_w.0, page_h_mm = page_h.0, dpi, "image page sized");

        Ok(save(&doc))
    }
}

fn save(doc: &PdfDocument) -> Vec<u8> {
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "printpdf reported warnings");
    }
    output
}

// -- Text wrapping helper -----------------------------------------------------

/// Wrap text so no line exceeds `max_width` characters.
///
/// Existing newlines are kept, including blank lines between paragraphs.
/// Words longer than a line are broken on character boundaries.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut result = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_chars = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word_chars: Vec<char> = word.chars().collect();

            while word_chars.len() > max_width {
                if line_chars > 0 {
                    result.push(std::mem::take(&mut line));
                    line_chars = 0;
                }
                let rest = word_chars.split_off(max_width);
                result.push(word_chars.into_iter().collect());
                word_chars = rest;
            }
            if word_chars.is_empty() {
                continue;
            }

            let needed = if line_chars == 0 {
                word_chars.len()
            } else {
                line_chars + 1 + word_chars.len()
            };
            if needed > max_width {
                result.push(std::mem::take(&mut line));
                line_chars = 0;
            }
            if line_chars > 0 {
                line.push(' ');
                line_chars += 1;
            }
            line_chars += word_chars.len();
            line.extend(word_chars);
        }

        result.push(line);
    }

    result
}
