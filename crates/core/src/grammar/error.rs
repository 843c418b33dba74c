#![forbid(unsafe_code)]

use serde_json::Value;
use std::fmt;

/// One step of the path from the document root to an offending node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Location inside a candidate document, rendered as `$.then[1].extends`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstructionPath {
    segments: Vec<PathSegment>,
}

impl InstructionPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(name.to_string()));
        Self { segments }
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The node this path points at inside `root`, if it exists.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                PathSegment::Field(name) => node.get(name.as_str()),
                PathSegment::Index(index) => node.get(*index),
            })
    }
}

impl fmt::Display for InstructionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// The grammar branch that was being matched when validation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Alternative {
    Instruction,
    SequenceItem,
    Step,
    LoadStep,
    FindStep,
}

impl Alternative {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::SequenceItem => "sequence item",
            Self::Step => "step",
            Self::LoadStep => "load step",
            Self::FindStep => "find step",
        }
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GrammarErrorKind {
    #[error("expected a string, an array or an object, found {found}")]
    NotAnInstruction { found: &'static str },
    #[error("a sequence may not directly contain another sequence")]
    NestedSequence,
    #[error("unrecognized field `{field}`")]
    UnknownField { field: String },
    #[error("must contain either `load` or `find` fields, not both")]
    AmbiguousStep,
    #[error("must contain either `load` or `find` (or `extends`), not neither")]
    MissingTarget,
    #[error("`{field}` is required unless `extends` is present")]
    MissingField { field: &'static str },
    #[error("`{field}` must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("`method` must be one of head, get, post; found {found:?}")]
    InvalidMethod { found: String },
    #[error("`match` is exclusive of `min` and `max`")]
    MatchWithRange,
    #[error("instruction nesting exceeds {limit} levels")]
    TooDeep { limit: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid {alternative} at {path}: {kind}")]
pub struct GrammarError {
    pub kind: GrammarErrorKind,
    pub path: InstructionPath,
    pub alternative: Alternative,
}

impl GrammarError {
    pub(crate) fn new(kind: GrammarErrorKind, path: &InstructionPath, alternative: Alternative) -> Self {
        Self {
            kind,
            path: path.clone(),
            alternative,
        }
    }
}
