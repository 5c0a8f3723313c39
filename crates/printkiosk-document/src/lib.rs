// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printkiosk-document — Turning uploads into one printable PDF.
//
// Provides content sniffing, per-format conversion to PDF (with a degraded
// text-only tier for DOCX), PDF generation from text and raster images, and
// order-preserving PDF merge.

pub mod convert;
pub mod docx;
pub mod pdf;
pub mod sniff;

pub use convert::{Conversion, FormatConverter, OfficeRenderer, RendererTier, WordRenderer};
pub use pdf::merge::PdfMerger;
pub use pdf::reader::PdfReader;
pub use pdf::writer::PdfWriter;
pub use sniff::{sniff_bytes, sniff_file};
