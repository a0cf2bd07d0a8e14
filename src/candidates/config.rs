use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::util::{read_json, sanitize_for_id};

use super::matcher::{
    AcceptAll, DictionaryMatch, FigureFormat, Intersect, Matcher, MinFigureSize, RegexMatch,
};
use super::space::{CandidateSpace, FigureSpace, PhraseSpace};
use super::throttler::{MaxPageDistance, SamePage, Throttler};
use super::{Relation, RelationArgument};

pub const DEFAULT_RELATION: &str = "transistor_image";

/// Declarative relation definition, read from JSON.
///
/// ```json
/// {
///   "name": "transistor_image",
///   "arguments": [
///     { "space": { "type": "figures", "formats": ["png"] }, "matcher": { "type": "accept_all" } }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub arguments: Vec<ArgumentConfig>,
    #[serde(default)]
    pub throttler: Option<ThrottlerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentConfig {
    pub space: SpaceConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpaceConfig {
    Figures {
        #[serde(default)]
        formats: Vec<String>,
    },
    Phrases,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatcherConfig {
    #[default]
    AcceptAll,
    FigureFormat {
        formats: Vec<String>,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        ignore_case: bool,
    },
    Dictionary {
        terms: Vec<String>,
    },
    MinFigureSize {
        min_width: i64,
        min_height: i64,
    },
    Intersect {
        matchers: Vec<MatcherConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThrottlerConfig {
    SamePage,
    MaxPageDistance { max_distance: i64 },
}

impl RelationConfig {
    /// PNG figures, every one accepted, no throttling.
    pub fn transistor_image() -> Self {
        Self {
            name: DEFAULT_RELATION.to_string(),
            arguments: vec![ArgumentConfig {
                space: SpaceConfig::Figures {
                    formats: vec!["png".to_string()],
                },
                matcher: MatcherConfig::AcceptAll,
            }],
            throttler: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path).with_context(|| format!("invalid relation config {}", path.display()))
    }

    pub fn compile(&self) -> Result<Relation> {
        if self.name.is_empty() || sanitize_for_id(&self.name) != self.name {
            bail!(
                "relation name must be lowercase alphanumerics and underscores: {:?}",
                self.name
            );
        }
        if self.arguments.is_empty() {
            bail!("relation {} needs at least one argument", self.name);
        }

        let arguments = self
            .arguments
            .iter()
            .enumerate()
            .map(|(position, argument)| {
                Ok(RelationArgument {
                    space: compile_space(&argument.space),
                    matcher: compile_matcher(&argument.matcher).with_context(|| {
                        format!("invalid matcher for argument {position} of {}", self.name)
                    })?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let throttler = self
            .throttler
            .as_ref()
            .map(compile_throttler)
            .transpose()
            .with_context(|| format!("invalid throttler for {}", self.name))?;

        Ok(Relation {
            name: self.name.clone(),
            arguments,
            throttler,
        })
    }
}

fn compile_space(config: &SpaceConfig) -> Box<dyn CandidateSpace> {
    match config {
        SpaceConfig::Figures { formats } => Box::new(FigureSpace::new(formats)),
        SpaceConfig::Phrases => Box::new(PhraseSpace),
    }
}

fn compile_matcher(config: &MatcherConfig) -> Result<Box<dyn Matcher>> {
    let matcher: Box<dyn Matcher> = match config {
        MatcherConfig::AcceptAll => Box::new(AcceptAll),
        MatcherConfig::FigureFormat { formats } => {
            if formats.is_empty() {
                bail!("figure_format matcher needs at least one format");
            }
            Box::new(FigureFormat::new(formats))
        }
        MatcherConfig::Regex {
            pattern,
            ignore_case,
        } => {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(*ignore_case)
                .build()
                .with_context(|| format!("failed to compile matcher regex {pattern:?}"))?;
            Box::new(RegexMatch::new(regex))
        }
        MatcherConfig::Dictionary { terms } => {
            if terms.iter().all(|term| term.trim().is_empty()) {
                bail!("dictionary matcher needs at least one term");
            }
            Box::new(DictionaryMatch::new(terms))
        }
        MatcherConfig::MinFigureSize {
            min_width,
            min_height,
        } => {
            if *min_width < 0 || *min_height < 0 {
                bail!("figure size bounds must be non-negative");
            }
            Box::new(MinFigureSize {
                min_width: *min_width,
                min_height: *min_height,
            })
        }
        MatcherConfig::Intersect { matchers } => Box::new(Intersect::new(
            matchers
                .iter()
                .map(compile_matcher)
                .collect::<Result<Vec<_>>>()?,
        )),
    };
    Ok(matcher)
}

fn compile_throttler(config: &ThrottlerConfig) -> Result<Box<dyn Throttler>> {
    let throttler: Box<dyn Throttler> = match config {
        ThrottlerConfig::SamePage => Box::new(SamePage),
        ThrottlerConfig::MaxPageDistance { max_distance } => {
            if *max_distance < 0 {
                bail!("max_distance must be non-negative");
            }
            Box::new(MaxPageDistance {
                max_distance: *max_distance,
            })
        }
    };
    Ok(throttler)
}
