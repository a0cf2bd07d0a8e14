//! Unified per-document model built from the HTML and PDF renditions of a datasheet.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::RawDocument;

mod align;
mod html;
mod lingual;
mod pdf;
#[cfg(test)]
mod tests;

pub use pdf::{PdfPage, tool_version};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Modalities {
    pub structural: bool,
    pub lingual: bool,
    pub tabular: bool,
    pub visual: bool,
}

impl Default for Modalities {
    fn default() -> Self {
        Self {
            structural: true,
            lingual: true,
            tabular: true,
            visual: true,
        }
    }
}

/// Point in time after which a document parse stops working. The default
/// never expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub fn expired(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub page: i64,
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl BoundingBox {
    fn union(self, other: BoundingBox) -> BoundingBox {
        BoundingBox {
            page: self.page,
            top: self.top.min(other.top),
            left: self.left.min(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.max(other.right),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Phrase {
    pub position: i64,
    pub text: String,
    pub html_tag: Option<String>,
    pub xpath: Option<String>,
    pub html_attrs: Vec<String>,
    pub words: Vec<String>,
    pub char_offsets: Vec<usize>,
    pub lemmas: Vec<String>,
    pub abs_char_offset: usize,
    pub table_position: Option<i64>,
    pub cell_position: Option<i64>,
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub position: i64,
    pub xpath: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub position: i64,
    pub table_position: i64,
    pub row_start: i64,
    pub row_end: i64,
    pub col_start: i64,
    pub col_end: i64,
    pub text: String,
    pub xpath: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Figure {
    pub position: i64,
    pub url: String,
    pub format: Option<String>,
    pub alt: Option<String>,
    pub xpath: Option<String>,
    pub page: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub name: String,
    pub pages: Vec<PdfPage>,
    pub phrases: Vec<Phrase>,
    pub tables: Vec<Table>,
    pub cells: Vec<Cell>,
    pub figures: Vec<Figure>,
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    pub fn aligned_phrase_count(&self) -> usize {
        self.phrases
            .iter()
            .filter(|phrase| phrase.bbox.is_some())
            .count()
    }
}

/// Parses one document. PDF tool failures degrade to warnings; HTML read
/// failures are errors for this document only. Passing `deadline` aborts the
/// HTML walk and kills running PDF tools.
pub fn parse_document(
    raw: &RawDocument,
    modalities: Modalities,
    max_pages: Option<usize>,
    deadline: Deadline,
) -> Result<ParsedDocument> {
    let html_bytes = fs::read(&raw.html_path)
        .with_context(|| format!("failed to read {}", raw.html_path.display()))?;
    let html_source = String::from_utf8_lossy(&html_bytes);

    let mut document = html::parse_html(&raw.name, &html_source, modalities, deadline)?;

    if modalities.visual {
        apply_visual_layer(&mut document, &raw.pdf_path, max_pages, deadline);
        if deadline.expired() {
            bail!("deadline passed while reading {}", raw.pdf_path.display());
        }
    }

    debug!(
        document = %document.name,
        phrases = document.phrases.len(),
        tables = document.tables.len(),
        figures = document.figures.len(),
        "parsed document"
    );

    Ok(document)
}

fn apply_visual_layer(
    document: &mut ParsedDocument,
    pdf_path: &Path,
    max_pages: Option<usize>,
    deadline: Deadline,
) {
    match pdf::extract_word_layer(pdf_path, max_pages, deadline) {
        Ok(layer) => {
            align::align_phrases(&mut document.phrases, &layer);
            document.pages = layer.pages;
        }
        Err(err) => {
            let warning = format!(
                "failed to read word layer for {}: {err:#}",
                pdf_path.display()
            );
            warn!(warning = %warning, "pdf word layer warning");
            document.warnings.push(warning);
        }
    }

    match pdf::extract_image_list(pdf_path, max_pages, deadline) {
        Ok(images) => {
            if images.len() != document.figures.len() {
                document.warnings.push(format!(
                    "figure count mismatch for {}: html={} pdf={}",
                    document.name,
                    document.figures.len(),
                    images.len()
                ));
            }
            align::align_figures(&mut document.figures, &images);
        }
        Err(err) => {
            let warning = format!("failed to list images for {}: {err:#}", pdf_path.display());
            warn!(warning = %warning, "pdf image list warning");
            document.warnings.push(warning);
        }
    }
}
