use anyhow::Result;
use rusqlite::Connection;

use crate::store::{ElementKind, ElementRef, StoredFigure, StoredPhrase, load_figures, load_phrases};

/// A stored element seen as a possible relation argument.
#[derive(Debug, Clone, Copy)]
pub enum Mention<'a> {
    Figure(&'a StoredFigure),
    Phrase(&'a StoredPhrase),
}

impl Mention<'_> {
    pub fn element_ref(&self) -> ElementRef {
        match self {
            Self::Figure(figure) => ElementRef {
                kind: ElementKind::Figure,
                id: figure.figure_id.clone(),
            },
            Self::Phrase(phrase) => ElementRef {
                kind: ElementKind::Phrase,
                id: phrase.phrase_id.clone(),
            },
        }
    }

    pub fn page(&self) -> Option<i64> {
        match self {
            Self::Figure(figure) => figure.page,
            Self::Phrase(phrase) => phrase.page,
        }
    }
}

/// Elements of one stored document, loaded once per extraction.
#[derive(Debug, Default)]
pub struct DocumentContext {
    pub figures: Vec<StoredFigure>,
    pub phrases: Vec<StoredPhrase>,
}

impl DocumentContext {
    /// Loads only the element kinds listed.
    pub fn load(connection: &Connection, doc_id: &str, kinds: &[ElementKind]) -> Result<Self> {
        let figures = if kinds.contains(&ElementKind::Figure) {
            load_figures(connection, doc_id)?
        } else {
            Vec::new()
        };
        let phrases = if kinds.contains(&ElementKind::Phrase) {
            load_phrases(connection, doc_id)?
        } else {
            Vec::new()
        };

        Ok(Self { figures, phrases })
    }
}
