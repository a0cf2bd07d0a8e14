use anyhow::{Result, bail};
use tracing::debug;

use crate::split::Split;
use crate::store::{ElementRef, Store, replace_candidates};

use super::Relation;
use super::mention::{DocumentContext, Mention};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorState {
    Idle,
    Enumerating { doc_id: String },
    Filtering { doc_id: String },
    Persisting { doc_id: String },
    Done,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub tuples_enumerated: usize,
    pub rejected_by_matchers: usize,
    pub rejected_by_throttler: usize,
    pub persisted: usize,
}

/// Runs one relation over stored documents of one split.
///
/// Each [`process`](Self::process) call walks a document through
/// enumerating, filtering and persisting and returns to `Idle`; a failing
/// document also returns to `Idle` so the batch can continue. [`finish`]
/// moves to `Done`, after which no more documents are accepted.
///
/// [`finish`]: Self::finish
pub struct CandidateExtractor<'r> {
    relation: &'r Relation,
    split: Split,
    state: ExtractorState,
}

impl<'r> CandidateExtractor<'r> {
    pub fn new(relation: &'r Relation, split: Split) -> Self {
        Self {
            relation,
            split,
            state: ExtractorState::Idle,
        }
    }

    pub fn state(&self) -> &ExtractorState {
        &self.state
    }

    pub fn process(&mut self, store: &mut Store, doc_id: &str) -> Result<DocumentOutcome> {
        match &self.state {
            ExtractorState::Idle => {}
            ExtractorState::Done => bail!("extractor already finished"),
            other => bail!("extractor is busy: {other:?}"),
        }

        let result = self.run_document(store, doc_id);
        self.state = ExtractorState::Idle;
        result
    }

    pub fn finish(&mut self) {
        self.state = ExtractorState::Done;
    }

    fn run_document(&mut self, store: &mut Store, doc_id: &str) -> Result<DocumentOutcome> {
        let relation = self.relation;
        let mut outcome = DocumentOutcome::default();

        self.state = ExtractorState::Enumerating {
            doc_id: doc_id.to_string(),
        };
        let document =
            DocumentContext::load(store.connection(), doc_id, &relation.element_kinds())?;
        let enumerated: Vec<Vec<Mention<'_>>> = relation
            .arguments
            .iter()
            .map(|argument| argument.space.mentions(&document).collect())
            .collect();
        outcome.tuples_enumerated = product_len(&enumerated);

        self.state = ExtractorState::Filtering {
            doc_id: doc_id.to_string(),
        };
        let matched: Vec<Vec<Mention<'_>>> = relation
            .arguments
            .iter()
            .zip(enumerated)
            .map(|(argument, mentions)| {
                mentions
                    .into_iter()
                    .filter(|mention| argument.matcher.matches(mention))
                    .collect()
            })
            .collect();
        outcome.rejected_by_matchers = outcome
            .tuples_enumerated
            .saturating_sub(product_len(&matched));

        let mut survivors: Vec<Vec<ElementRef>> = Vec::new();
        for tuple in TupleProduct::new(&matched) {
            let keep = relation
                .throttler
                .as_ref()
                .is_none_or(|throttler| throttler.keep(&tuple));
            if !keep {
                outcome.rejected_by_throttler += 1;
                continue;
            }
            survivors.push(tuple.iter().map(Mention::element_ref).collect());
        }

        self.state = ExtractorState::Persisting {
            doc_id: doc_id.to_string(),
        };
        outcome.persisted =
            replace_candidates(store, &relation.name, doc_id, self.split, &survivors)?;

        debug!(
            relation = %relation.name,
            split = self.split.as_str(),
            document = doc_id,
            enumerated = outcome.tuples_enumerated,
            persisted = outcome.persisted,
            "extracted candidates"
        );

        Ok(outcome)
    }
}

fn product_len<T>(lists: &[Vec<T>]) -> usize {
    lists
        .iter()
        .fold(1_usize, |total, list| total.saturating_mul(list.len()))
}

/// Lazy cartesian product over per-argument mention lists, last argument
/// varying fastest.
struct TupleProduct<'l, 'a> {
    lists: &'l [Vec<Mention<'a>>],
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'l, 'a> TupleProduct<'l, 'a> {
    fn new(lists: &'l [Vec<Mention<'a>>]) -> Self {
        Self {
            lists,
            indices: vec![0; lists.len()],
            exhausted: lists.is_empty() || lists.iter().any(Vec::is_empty),
        }
    }
}

impl<'a> Iterator for TupleProduct<'_, 'a> {
    type Item = Vec<Mention<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let tuple = self
            .indices
            .iter()
            .zip(self.lists)
            .map(|(&index, list)| list[index])
            .collect();

        let mut slot = self.indices.len();
        loop {
            if slot == 0 {
                self.exhausted = true;
                break;
            }
            slot -= 1;
            self.indices[slot] += 1;
            if self.indices[slot] < self.lists[slot].len() {
                break;
            }
            self.indices[slot] = 0;
        }

        Some(tuple)
    }
}
