//! Discovery of paired HTML/PDF datasheets under a corpus directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::warn;

use crate::model::{DocumentFailure, FailureKind, RawDocument};
use crate::util::sha256_file;

const HTML_EXTENSIONS: &[&str] = &["html", "htm"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];

#[derive(Debug, Clone)]
struct DocumentPair {
    name: String,
    html_path: PathBuf,
    pdf_path: PathBuf,
}

/// Result of pairing a corpus directory. Iterating `documents()` again restarts
/// from the first document.
#[derive(Debug, Clone)]
pub struct CorpusScan {
    pairs: Vec<DocumentPair>,
    skipped: Vec<DocumentFailure>,
}

impl CorpusScan {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn skipped(&self) -> &[DocumentFailure] {
        &self.skipped
    }

    /// Hashes each pair lazily as it is yielded.
    pub fn documents(&self) -> impl Iterator<Item = Result<RawDocument>> + '_ {
        self.pairs.iter().map(|pair| {
            Ok(RawDocument {
                name: pair.name.clone(),
                html_sha256: sha256_file(&pair.html_path)?,
                pdf_sha256: sha256_file(&pair.pdf_path)?,
                html_path: pair.html_path.clone(),
                pdf_path: pair.pdf_path.clone(),
            })
        })
    }
}

pub fn scan(html_dir: &Path, pdf_dir: &Path, max_docs: Option<usize>) -> Result<CorpusScan> {
    if !html_dir.is_dir() {
        bail!("html directory not found: {}", html_dir.display());
    }

    let html_files = files_by_stem(html_dir, HTML_EXTENSIONS)?;
    let pdf_files = if pdf_dir.is_dir() {
        files_by_stem(pdf_dir, PDF_EXTENSIONS)?
    } else {
        warn!(path = %pdf_dir.display(), "pdf directory not found");
        BTreeMap::new()
    };

    let mut pairs = Vec::new();
    let mut skipped = Vec::new();

    for (name, html_path) in &html_files {
        match pdf_files.get(name) {
            Some(pdf_path) => pairs.push(DocumentPair {
                name: name.clone(),
                html_path: html_path.clone(),
                pdf_path: pdf_path.clone(),
            }),
            None => skipped.push(DocumentFailure::new(
                name,
                FailureKind::MissingSource,
                format!("no PDF rendition for {}", html_path.display()),
            )),
        }
    }

    for (name, pdf_path) in &pdf_files {
        if !html_files.contains_key(name) {
            skipped.push(DocumentFailure::new(
                name,
                FailureKind::MissingSource,
                format!("no HTML rendition for {}", pdf_path.display()),
            ));
        }
    }

    if let Some(max_docs) = max_docs {
        pairs.truncate(max_docs);
    }

    for failure in &skipped {
        warn!(document = %failure.name, reason = %failure.message, "skipping unpaired document");
    }

    Ok(CorpusScan { pairs, skipped })
}

fn files_by_stem(dir: &Path, extensions: &[&str]) -> Result<BTreeMap<String, PathBuf>> {
    let mut files = Vec::new();

    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate)))
            .unwrap_or(false);

        if matches_extension {
            files.push(path);
        }
    }

    files.sort();

    let mut by_stem = BTreeMap::new();
    for path in files {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };

        if by_stem.contains_key(stem) {
            warn!(path = %path.display(), "duplicate document name, keeping first file");
            continue;
        }
        by_stem.insert(stem.to_string(), path.clone());
    }

    Ok(by_stem)
}
