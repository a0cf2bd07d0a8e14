//! SQLite-backed store for parsed documents, their elements and extracted candidates.
//!
//! Every worker opens its own [`Store`]; WAL mode plus a busy timeout lets
//! writers on separate connections take turns without a process-wide lock.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

mod read;
mod schema;
mod write;

pub use read::{
    CandidateView, StoredFigure, StoredPhrase, candidate_at, candidate_counts, count_candidates,
    document_names, documents_in_split, element_counts, load_figures, load_phrases,
    unassigned_document_count,
};
pub use schema::DB_SCHEMA_VERSION;
pub use write::{PersistStats, apply_split_assignment, persist_document, replace_candidates};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ElementKind {
    Phrase,
    Figure,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phrase => "phrase",
            Self::Figure => "figure",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "phrase" => Ok(Self::Phrase),
            "figure" => Ok(Self::Figure),
            other => bail!("unknown element type: {other}"),
        }
    }
}

/// One argument of a candidate tuple as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: String,
}

pub struct Store {
    connection: Connection,
}

impl Store {
    /// Opens an existing store without touching the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let connection =
            Connection::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        configure_connection(&connection)?;
        Ok(Self { connection })
    }

    /// Opens (creating if needed) and brings the schema up to date.
    pub fn open_and_migrate(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            crate::util::ensure_directory(parent)?;
        }
        let store = Self::open(path)?;
        schema::ensure_schema(&store.connection)?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory store")?;
        connection
            .pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys")?;
        schema::ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    Ok(())
}

pub fn phrase_id(doc_id: &str, position: i64) -> String {
    format!("{doc_id}:phrase:{position:05}")
}

pub fn figure_id(doc_id: &str, position: i64) -> String {
    format!("{doc_id}:figure:{position:03}")
}

pub fn table_id(doc_id: &str, position: i64) -> String {
    format!("{doc_id}:table:{position:03}")
}

pub fn cell_id(doc_id: &str, position: i64) -> String {
    format!("{doc_id}:cell:{position:05}")
}
