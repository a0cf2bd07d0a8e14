//! Candidate spaces, matchers and throttlers, and the extractor that turns
//! stored documents into candidate tuples.

use crate::store::ElementKind;

mod config;
mod extractor;
mod matcher;
mod mention;
mod space;
mod throttler;

pub use config::{DEFAULT_RELATION, RelationConfig};
pub use extractor::{CandidateExtractor, DocumentOutcome};

use matcher::Matcher;
use space::CandidateSpace;
use throttler::Throttler;

struct RelationArgument {
    space: Box<dyn CandidateSpace>,
    matcher: Box<dyn Matcher>,
}

/// A compiled relation: one space and one matcher per argument position.
pub struct Relation {
    pub name: String,
    arguments: Vec<RelationArgument>,
    throttler: Option<Box<dyn Throttler>>,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.arguments.len()
    }

    fn element_kinds(&self) -> Vec<ElementKind> {
        let mut kinds: Vec<ElementKind> = Vec::new();
        for argument in &self.arguments {
            let kind = argument.space.element_kind();
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }
}
