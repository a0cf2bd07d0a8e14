use std::collections::HashSet;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use super::mention::Mention;

/// Accept/reject predicate over a single mention.
pub trait Matcher: Send + Sync {
    fn matches(&self, mention: &Mention<'_>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Matcher for AcceptAll {
    fn matches(&self, _mention: &Mention<'_>) -> bool {
        true
    }
}

/// Accepts figures whose format is in the set. Phrases never match.
#[derive(Debug, Clone)]
pub struct FigureFormat {
    formats: HashSet<String>,
}

impl FigureFormat {
    pub fn new(formats: &[String]) -> Self {
        Self {
            formats: formats
                .iter()
                .map(|format| format.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Matcher for FigureFormat {
    fn matches(&self, mention: &Mention<'_>) -> bool {
        match mention {
            Mention::Figure(figure) => figure
                .format
                .as_deref()
                .is_some_and(|format| self.formats.contains(format)),
            Mention::Phrase(_) => false,
        }
    }
}

/// Searches phrase text, or a figure's URL and alt text.
#[derive(Debug, Clone)]
pub struct RegexMatch {
    regex: Regex,
}

impl RegexMatch {
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl Matcher for RegexMatch {
    fn matches(&self, mention: &Mention<'_>) -> bool {
        match mention {
            Mention::Phrase(phrase) => self.regex.is_match(&phrase.text),
            Mention::Figure(figure) => {
                self.regex.is_match(&figure.url)
                    || figure
                        .alt
                        .as_deref()
                        .is_some_and(|alt| self.regex.is_match(alt))
            }
        }
    }
}

/// Case-insensitive whole-word lookup. Multi-word terms must appear as a
/// contiguous word sequence.
#[derive(Debug, Clone)]
pub struct DictionaryMatch {
    terms: Vec<Vec<String>>,
}

impl DictionaryMatch {
    pub fn new(terms: &[String]) -> Self {
        let mut seen = HashSet::new();
        let terms = terms
            .iter()
            .map(|term| lowercase_words(term))
            .filter(|words| !words.is_empty())
            .filter(|words| seen.insert(words.clone()))
            .collect();
        Self { terms }
    }

    fn matches_text(&self, text: &str) -> bool {
        let words = lowercase_words(text);
        self.terms.iter().any(|term| {
            words
                .windows(term.len())
                .any(|window| window == term.as_slice())
        })
    }
}

impl Matcher for DictionaryMatch {
    fn matches(&self, mention: &Mention<'_>) -> bool {
        match mention {
            Mention::Phrase(phrase) => self.matches_text(&phrase.text),
            Mention::Figure(figure) => figure
                .alt
                .as_deref()
                .is_some_and(|alt| self.matches_text(alt)),
        }
    }
}

fn lowercase_words(text: &str) -> Vec<String> {
    text.unicode_words().map(str::to_lowercase).collect()
}

/// Figures at least this large in pixels. Figures without known
/// dimensions are rejected.
#[derive(Debug, Clone, Copy)]
pub struct MinFigureSize {
    pub min_width: i64,
    pub min_height: i64,
}

impl Matcher for MinFigureSize {
    fn matches(&self, mention: &Mention<'_>) -> bool {
        match mention {
            Mention::Figure(figure) => match (figure.width, figure.height) {
                (Some(width), Some(height)) => width >= self.min_width && height >= self.min_height,
                _ => false,
            },
            Mention::Phrase(_) => false,
        }
    }
}

/// Logical AND of its children. An empty intersection accepts everything.
pub struct Intersect {
    matchers: Vec<Box<dyn Matcher>>,
}

impl Intersect {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for Intersect {
    fn matches(&self, mention: &Mention<'_>) -> bool {
        self.matchers.iter().all(|matcher| matcher.matches(mention))
    }
}
