use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::split::Split;

use super::ElementKind;

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct StoreCounts {
    pub documents: i64,
    pub pages: i64,
    pub phrases: i64,
    pub tables: i64,
    pub cells: i64,
    pub figures: i64,
    pub candidates: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CandidateCount {
    pub relation: String,
    pub split: Split,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFigure {
    pub figure_id: String,
    pub doc_id: String,
    pub position: i64,
    pub url: String,
    pub format: Option<String>,
    pub alt: Option<String>,
    pub page: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPhrase {
    pub phrase_id: String,
    pub doc_id: String,
    pub position: i64,
    pub text: String,
    pub html_tag: Option<String>,
    pub page: Option<i64>,
    pub cell_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArgumentView {
    pub position: i64,
    pub element_type: String,
    pub element_id: String,
    pub page: Option<i64>,
    pub url: Option<String>,
    pub format: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub candidate_id: String,
    pub relation: String,
    pub doc_id: String,
    pub split: Split,
    pub arguments: Vec<ArgumentView>,
}

fn count_rows(connection: &Connection, table: &str) -> Result<i64> {
    connection
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .with_context(|| format!("failed to count rows in {table}"))
}

pub fn element_counts(connection: &Connection) -> Result<StoreCounts> {
    Ok(StoreCounts {
        documents: count_rows(connection, "documents")?,
        pages: count_rows(connection, "pages")?,
        phrases: count_rows(connection, "phrases")?,
        tables: count_rows(connection, "doc_tables")?,
        cells: count_rows(connection, "cells")?,
        figures: count_rows(connection, "figures")?,
        candidates: count_rows(connection, "candidates")?,
    })
}

pub fn candidate_counts(connection: &Connection) -> Result<Vec<CandidateCount>> {
    let mut statement = connection.prepare(
        "
        SELECT relation, split, COUNT(*)
        FROM candidates
        GROUP BY relation, split
        ORDER BY relation ASC, split ASC
        ",
    )?;
    let rows = statement.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut counts = Vec::new();
    for row in rows {
        let (relation, code, count) = row?;
        if let Some(split) = Split::from_code(code) {
            counts.push(CandidateCount {
                relation,
                split,
                count,
            });
        }
    }
    Ok(counts)
}

/// Candidate rows of a relation, optionally restricted to one split.
pub fn count_candidates(
    connection: &Connection,
    relation: &str,
    split: Option<Split>,
) -> Result<i64> {
    let count = match split {
        Some(split) => connection.query_row(
            "SELECT COUNT(*) FROM candidates WHERE relation = ?1 AND split = ?2",
            params![relation, split.code()],
            |row| row.get(0),
        )?,
        None => connection.query_row(
            "SELECT COUNT(*) FROM candidates WHERE relation = ?1",
            [relation],
            |row| row.get(0),
        )?,
    };
    Ok(count)
}

pub fn document_names(connection: &Connection) -> Result<Vec<String>> {
    let mut statement = connection.prepare("SELECT doc_id FROM documents ORDER BY doc_id ASC")?;
    let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to list documents")
}

pub fn documents_in_split(connection: &Connection, split: Split) -> Result<Vec<String>> {
    let mut statement =
        connection.prepare("SELECT doc_id FROM documents WHERE split = ?1 ORDER BY doc_id ASC")?;
    let rows = statement.query_map([split.code()], |row| row.get::<_, String>(0))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {} documents", split.as_str()))
}

pub fn unassigned_document_count(connection: &Connection) -> Result<i64> {
    connection
        .query_row(
            "SELECT COUNT(*) FROM documents WHERE split IS NULL",
            [],
            |row| row.get(0),
        )
        .context("failed to count unassigned documents")
}

pub fn load_figures(connection: &Connection, doc_id: &str) -> Result<Vec<StoredFigure>> {
    let mut statement = connection.prepare(
        "
        SELECT figure_id, doc_id, position, url, format, alt, page, width, height
        FROM figures
        WHERE doc_id = ?1
        ORDER BY position ASC
        ",
    )?;
    let rows = statement.query_map([doc_id], |row| {
        Ok(StoredFigure {
            figure_id: row.get(0)?,
            doc_id: row.get(1)?,
            position: row.get(2)?,
            url: row.get(3)?,
            format: row.get(4)?,
            alt: row.get(5)?,
            page: row.get(6)?,
            width: row.get(7)?,
            height: row.get(8)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to load figures of {doc_id}"))
}

pub fn load_phrases(connection: &Connection, doc_id: &str) -> Result<Vec<StoredPhrase>> {
    let mut statement = connection.prepare(
        "
        SELECT phrase_id, doc_id, position, text, html_tag, page, cell_id
        FROM phrases
        WHERE doc_id = ?1
        ORDER BY position ASC
        ",
    )?;
    let rows = statement.query_map([doc_id], |row| {
        Ok(StoredPhrase {
            phrase_id: row.get(0)?,
            doc_id: row.get(1)?,
            position: row.get(2)?,
            text: row.get(3)?,
            html_tag: row.get(4)?,
            page: row.get(5)?,
            cell_id: row.get(6)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to load phrases of {doc_id}"))
}

/// The `index`-th candidate of a relation in a split, ordered by document
/// name and then candidate id.
pub fn candidate_at(
    connection: &Connection,
    relation: &str,
    split: Split,
    index: usize,
) -> Result<Option<CandidateView>> {
    let head = connection
        .query_row(
            "
            SELECT candidate_id, doc_id
            FROM candidates
            WHERE relation = ?1 AND split = ?2
            ORDER BY doc_id ASC, candidate_id ASC
            LIMIT 1 OFFSET ?3
            ",
            params![relation, split.code(), index as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .context("failed to look up candidate")?;

    let Some((candidate_id, doc_id)) = head else {
        return Ok(None);
    };

    let mut statement = connection.prepare(
        "
        SELECT
          a.arg_position,
          a.element_type,
          a.element_id,
          COALESCE(f.page, p.page),
          f.url,
          f.format,
          p.text
        FROM candidate_args a
        LEFT JOIN figures f ON a.element_type = 'figure' AND f.figure_id = a.element_id
        LEFT JOIN phrases p ON a.element_type = 'phrase' AND p.phrase_id = a.element_id
        WHERE a.candidate_id = ?1
        ORDER BY a.arg_position ASC
        ",
    )?;
    let rows = statement.query_map([&candidate_id], |row| {
        Ok(ArgumentView {
            position: row.get(0)?,
            element_type: row.get(1)?,
            element_id: row.get(2)?,
            page: row.get(3)?,
            url: row.get(4)?,
            format: row.get(5)?,
            text: row.get(6)?,
        })
    })?;
    let arguments = rows.collect::<rusqlite::Result<Vec<_>>>()?;

    for argument in &arguments {
        ElementKind::parse(&argument.element_type)
            .with_context(|| format!("corrupt argument row in {candidate_id}"))?;
    }

    Ok(Some(CandidateView {
        candidate_id,
        relation: relation.to_string(),
        doc_id,
        split,
        arguments,
    }))
}
