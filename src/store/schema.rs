use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

pub(super) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS documents (
          doc_id TEXT PRIMARY KEY,
          html_path TEXT NOT NULL,
          pdf_path TEXT NOT NULL,
          html_sha256 TEXT NOT NULL,
          pdf_sha256 TEXT NOT NULL,
          page_count INTEGER,
          split INTEGER,
          parsed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pages (
          doc_id TEXT NOT NULL,
          page_number INTEGER NOT NULL,
          width REAL NOT NULL,
          height REAL NOT NULL,
          PRIMARY KEY (doc_id, page_number),
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id)
        );

        CREATE TABLE IF NOT EXISTS doc_tables (
          table_id TEXT PRIMARY KEY,
          doc_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          xpath TEXT,
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id)
        );

        CREATE TABLE IF NOT EXISTS cells (
          cell_id TEXT PRIMARY KEY,
          doc_id TEXT NOT NULL,
          table_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          row_start INTEGER NOT NULL,
          row_end INTEGER NOT NULL,
          col_start INTEGER NOT NULL,
          col_end INTEGER NOT NULL,
          text TEXT NOT NULL,
          xpath TEXT,
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id),
          FOREIGN KEY(table_id) REFERENCES doc_tables(table_id)
        );

        CREATE TABLE IF NOT EXISTS phrases (
          phrase_id TEXT PRIMARY KEY,
          doc_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          text TEXT NOT NULL,
          html_tag TEXT,
          xpath TEXT,
          html_attrs TEXT NOT NULL,
          words TEXT NOT NULL,
          char_offsets TEXT NOT NULL,
          lemmas TEXT NOT NULL,
          abs_char_offset INTEGER NOT NULL,
          table_id TEXT,
          cell_id TEXT,
          page INTEGER,
          bbox_top REAL,
          bbox_left REAL,
          bbox_bottom REAL,
          bbox_right REAL,
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id),
          FOREIGN KEY(table_id) REFERENCES doc_tables(table_id),
          FOREIGN KEY(cell_id) REFERENCES cells(cell_id)
        );

        CREATE TABLE IF NOT EXISTS figures (
          figure_id TEXT PRIMARY KEY,
          doc_id TEXT NOT NULL,
          position INTEGER NOT NULL,
          url TEXT NOT NULL,
          format TEXT,
          alt TEXT,
          xpath TEXT,
          page INTEGER,
          width INTEGER,
          height INTEGER,
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id)
        );

        CREATE TABLE IF NOT EXISTS candidates (
          candidate_id TEXT PRIMARY KEY,
          relation TEXT NOT NULL,
          doc_id TEXT NOT NULL,
          split INTEGER NOT NULL,
          arg_key TEXT NOT NULL,
          created_at TEXT NOT NULL,
          UNIQUE(relation, split, arg_key),
          FOREIGN KEY(doc_id) REFERENCES documents(doc_id)
        );

        CREATE TABLE IF NOT EXISTS candidate_args (
          candidate_id TEXT NOT NULL,
          arg_position INTEGER NOT NULL,
          element_type TEXT NOT NULL,
          element_id TEXT NOT NULL,
          PRIMARY KEY (candidate_id, arg_position),
          FOREIGN KEY(candidate_id) REFERENCES candidates(candidate_id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_documents_split ON documents(split, doc_id);
        CREATE INDEX IF NOT EXISTS idx_phrases_doc_position ON phrases(doc_id, position);
        CREATE INDEX IF NOT EXISTS idx_cells_doc_table ON cells(doc_id, table_id);
        CREATE INDEX IF NOT EXISTS idx_figures_doc_position ON figures(doc_id, position);
        CREATE INDEX IF NOT EXISTS idx_candidates_relation_split ON candidates(relation, split, doc_id);
        CREATE INDEX IF NOT EXISTS idx_candidates_doc_relation ON candidates(doc_id, relation);
        ",
        )
        .context("failed to initialize store schema")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}
