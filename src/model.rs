use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawDocument {
    pub name: String,
    pub html_path: PathBuf,
    pub pdf_path: PathBuf,
    pub html_sha256: String,
    pub pdf_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusInventoryManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub source_directory: String,
    pub max_docs: Option<usize>,
    pub document_count: usize,
    pub documents: Vec<RawDocument>,
    pub skipped: Vec<DocumentFailure>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingSource,
    Parse,
    Timeout,
    Store,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingSource => "missing_source",
            Self::Parse => "parse",
            Self::Timeout => "timeout",
            Self::Store => "store",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentFailure {
    pub name: String,
    pub kind: FailureKind,
    pub message: String,
}

impl DocumentFailure {
    pub fn new(name: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
    pub pdfimages: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub work_root: String,
    pub manifest_dir: String,
    pub inventory_manifest_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalityFlags {
    pub structural: bool,
    pub lingual: bool,
    pub tabular: bool,
    pub visual: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseCounts {
    pub document_count: usize,
    pub parsed_document_count: usize,
    pub failed_document_count: usize,
    pub phrases_inserted: usize,
    pub tables_inserted: usize,
    pub cells_inserted: usize,
    pub figures_inserted: usize,
    pub visually_aligned_phrases: usize,
    pub documents_total: i64,
    pub phrases_total: i64,
    pub figures_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParseRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub workers: usize,
    pub doc_timeout_secs: u64,
    pub modalities: ModalityFlags,
    pub tool_versions: ToolVersions,
    pub paths: RunPaths,
    pub counts: ParseCounts,
    pub failures: Vec<DocumentFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSplitCounts {
    pub split: String,
    pub document_count: usize,
    pub tuples_enumerated: usize,
    pub tuples_rejected_by_matchers: usize,
    pub tuples_rejected_by_throttler: usize,
    pub candidates_persisted: usize,
    pub candidates_total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub relation: String,
    pub arity: usize,
    pub db_path: String,
    pub splits: Vec<ExtractSplitCounts>,
    pub failures: Vec<DocumentFailure>,
}
