use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

use crate::model::RawDocument;
use crate::parser::{ParsedDocument, PdfPage};
use crate::split::Split;
use crate::util::now_utc_string;

use super::{ElementRef, Store, cell_id, figure_id, phrase_id, table_id};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistStats {
    pub pages: usize,
    pub phrases: usize,
    pub tables: usize,
    pub cells: usize,
    pub figures: usize,
}

/// Replaces everything stored for one document in a single transaction.
///
/// The document row keeps its split label across re-parses. Candidates of
/// the document are dropped since the elements they point at are rebuilt.
pub fn persist_document(
    store: &mut Store,
    raw: &RawDocument,
    parsed: &ParsedDocument,
) -> Result<PersistStats> {
    let doc_id = raw.name.as_str();
    let tx = store
        .connection_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .with_context(|| format!("failed to begin transaction for {doc_id}"))?;
    let mut stats = PersistStats::default();

    tx.execute(
        "
        INSERT INTO documents(doc_id, html_path, pdf_path, html_sha256, pdf_sha256, page_count, split, parsed_at)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)
        ON CONFLICT(doc_id) DO UPDATE SET
          html_path=excluded.html_path,
          pdf_path=excluded.pdf_path,
          html_sha256=excluded.html_sha256,
          pdf_sha256=excluded.pdf_sha256,
          page_count=excluded.page_count,
          parsed_at=excluded.parsed_at
        ",
        params![
            doc_id,
            raw.html_path.display().to_string(),
            raw.pdf_path.display().to_string(),
            &raw.html_sha256,
            &raw.pdf_sha256,
            (!parsed.pages.is_empty()).then_some(parsed.pages.len() as i64),
            now_utc_string(),
        ],
    )
    .with_context(|| format!("failed to upsert document row for {doc_id}"))?;

    tx.execute("DELETE FROM candidates WHERE doc_id = ?1", [doc_id])?;
    tx.execute("DELETE FROM phrases WHERE doc_id = ?1", [doc_id])?;
    tx.execute("DELETE FROM cells WHERE doc_id = ?1", [doc_id])?;
    tx.execute("DELETE FROM doc_tables WHERE doc_id = ?1", [doc_id])?;
    tx.execute("DELETE FROM figures WHERE doc_id = ?1", [doc_id])?;
    tx.execute("DELETE FROM pages WHERE doc_id = ?1", [doc_id])?;

    stats.pages = insert_pages(&tx, doc_id, &parsed.pages)?;

    {
        let mut table_statement = tx.prepare(
            "INSERT INTO doc_tables(table_id, doc_id, position, xpath) VALUES(?1, ?2, ?3, ?4)",
        )?;
        for table in &parsed.tables {
            table_statement.execute(params![
                table_id(doc_id, table.position),
                doc_id,
                table.position,
                &table.xpath
            ])?;
            stats.tables += 1;
        }

        let mut cell_statement = tx.prepare(
            "
            INSERT INTO cells(
              cell_id, doc_id, table_id, position,
              row_start, row_end, col_start, col_end, text, xpath
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )?;
        for cell in &parsed.cells {
            cell_statement.execute(params![
                cell_id(doc_id, cell.position),
                doc_id,
                table_id(doc_id, cell.table_position),
                cell.position,
                cell.row_start,
                cell.row_end,
                cell.col_start,
                cell.col_end,
                &cell.text,
                &cell.xpath
            ])?;
            stats.cells += 1;
        }

        let mut phrase_statement = tx.prepare(
            "
            INSERT INTO phrases(
              phrase_id, doc_id, position, text, html_tag, xpath,
              html_attrs, words, char_offsets, lemmas, abs_char_offset,
              table_id, cell_id, page, bbox_top, bbox_left, bbox_bottom, bbox_right
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            ",
        )?;
        for phrase in &parsed.phrases {
            let bbox = phrase.bbox;
            phrase_statement
                .execute(params![
                    phrase_id(doc_id, phrase.position),
                    doc_id,
                    phrase.position,
                    &phrase.text,
                    &phrase.html_tag,
                    &phrase.xpath,
                    serde_json::to_string(&phrase.html_attrs)?,
                    serde_json::to_string(&phrase.words)?,
                    serde_json::to_string(&phrase.char_offsets)?,
                    serde_json::to_string(&phrase.lemmas)?,
                    phrase.abs_char_offset as i64,
                    phrase.table_position.map(|position| table_id(doc_id, position)),
                    phrase.cell_position.map(|position| cell_id(doc_id, position)),
                    bbox.map(|bbox| bbox.page),
                    bbox.map(|bbox| bbox.top),
                    bbox.map(|bbox| bbox.left),
                    bbox.map(|bbox| bbox.bottom),
                    bbox.map(|bbox| bbox.right),
                ])
                .with_context(|| {
                    format!("failed to insert phrase {} of {doc_id}", phrase.position)
                })?;
            stats.phrases += 1;
        }

        let mut figure_statement = tx.prepare(
            "
            INSERT INTO figures(figure_id, doc_id, position, url, format, alt, xpath, page, width, height)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )?;
        for figure in &parsed.figures {
            figure_statement.execute(params![
                figure_id(doc_id, figure.position),
                doc_id,
                figure.position,
                &figure.url,
                &figure.format,
                &figure.alt,
                &figure.xpath,
                figure.page,
                figure.width,
                figure.height
            ])?;
            stats.figures += 1;
        }
    }

    tx.commit()
        .with_context(|| format!("failed to commit document {doc_id}"))?;
    Ok(stats)
}

fn insert_pages(tx: &Transaction<'_>, doc_id: &str, pages: &[PdfPage]) -> Result<usize> {
    let mut statement = tx.prepare(
        "INSERT INTO pages(doc_id, page_number, width, height) VALUES(?1, ?2, ?3, ?4)",
    )?;
    for page in pages {
        statement
            .execute(params![doc_id, page.number, page.width, page.height])
            .with_context(|| format!("failed to insert page {} of {doc_id}", page.number))?;
    }
    Ok(pages.len())
}

/// Writes split labels for the given documents. Candidates recorded under a
/// different split than the document's new label are removed so a document
/// never contributes candidates to two splits.
pub fn apply_split_assignment(store: &mut Store, assignment: &[(String, Split)]) -> Result<usize> {
    let tx = store
        .connection_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin split transaction")?;
    let mut updated = 0;

    {
        let mut update_statement =
            tx.prepare("UPDATE documents SET split = ?2 WHERE doc_id = ?1")?;
        let mut prune_statement =
            tx.prepare("DELETE FROM candidates WHERE doc_id = ?1 AND split != ?2")?;

        for (doc_id, split) in assignment {
            updated += update_statement.execute(params![doc_id, split.code()])?;
            prune_statement.execute(params![doc_id, split.code()])?;
        }
    }

    tx.commit().context("failed to commit split assignment")?;
    Ok(updated)
}

/// Stores the candidate set of one relation for one document, replacing
/// whatever that relation held for the document before. Returns the number
/// of candidate rows written.
pub fn replace_candidates(
    store: &mut Store,
    relation: &str,
    doc_id: &str,
    split: Split,
    tuples: &[Vec<ElementRef>],
) -> Result<usize> {
    let tx = store
        .connection_mut()
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .with_context(|| format!("failed to begin candidate transaction for {doc_id}"))?;

    let known = tx
        .query_row(
            "SELECT 1 FROM documents WHERE doc_id = ?1",
            [doc_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if known.is_none() {
        bail!("document {doc_id} has not been parsed into the store");
    }

    tx.execute(
        "DELETE FROM candidates WHERE relation = ?1 AND doc_id = ?2",
        params![relation, doc_id],
    )?;

    let created_at = now_utc_string();
    let mut written = 0;
    {
        let mut candidate_statement = tx.prepare(
            "
            INSERT INTO candidates(candidate_id, relation, doc_id, split, arg_key, created_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT DO NOTHING
            ",
        )?;
        let mut argument_statement = tx.prepare(
            "
            INSERT INTO candidate_args(candidate_id, arg_position, element_type, element_id)
            VALUES(?1, ?2, ?3, ?4)
            ",
        )?;

        for tuple in tuples {
            let arg_key = tuple
                .iter()
                .map(|element| element.id.as_str())
                .collect::<Vec<_>>()
                .join("|");
            let candidate_id = format!("{relation}:{}:{arg_key}", split.as_str());

            let inserted = candidate_statement.execute(params![
                &candidate_id,
                relation,
                doc_id,
                split.code(),
                &arg_key,
                &created_at
            ])?;
            if inserted == 0 {
                continue;
            }

            for (position, element) in tuple.iter().enumerate() {
                argument_statement.execute(params![
                    &candidate_id,
                    position as i64,
                    element.kind.as_str(),
                    &element.id
                ])?;
            }
            written += 1;
        }
    }

    tx.commit()
        .with_context(|| format!("failed to commit candidates for {doc_id}"))?;
    Ok(written)
}
