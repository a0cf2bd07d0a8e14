use crate::store::ElementKind;

use super::mention::{DocumentContext, Mention};

/// Enumerates the mentions of one document that may fill an argument slot.
pub trait CandidateSpace: Send + Sync {
    fn element_kind(&self) -> ElementKind;

    fn mentions<'a>(
        &'a self,
        document: &'a DocumentContext,
    ) -> Box<dyn Iterator<Item = Mention<'a>> + 'a>;
}

/// Figures, optionally restricted to a set of lowercase formats.
#[derive(Debug, Clone, Default)]
pub struct FigureSpace {
    formats: Vec<String>,
}

impl FigureSpace {
    pub fn new(formats: &[String]) -> Self {
        Self {
            formats: formats
                .iter()
                .map(|format| format.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|format| !format.is_empty())
                .collect(),
        }
    }

    fn accepts(&self, format: Option<&str>) -> bool {
        self.formats.is_empty()
            || format.is_some_and(|format| self.formats.iter().any(|wanted| wanted == format))
    }
}

impl CandidateSpace for FigureSpace {
    fn element_kind(&self) -> ElementKind {
        ElementKind::Figure
    }

    fn mentions<'a>(
        &'a self,
        document: &'a DocumentContext,
    ) -> Box<dyn Iterator<Item = Mention<'a>> + 'a> {
        Box::new(
            document
                .figures
                .iter()
                .filter(move |figure| self.accepts(figure.format.as_deref()))
                .map(Mention::Figure),
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseSpace;

impl CandidateSpace for PhraseSpace {
    fn element_kind(&self) -> ElementKind {
        ElementKind::Phrase
    }

    fn mentions<'a>(
        &'a self,
        document: &'a DocumentContext,
    ) -> Box<dyn Iterator<Item = Mention<'a>> + 'a> {
        Box::new(document.phrases.iter().map(Mention::Phrase))
    }
}
