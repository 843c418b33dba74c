#![forbid(unsafe_code)]

use crate::grammar::GrammarError;
use crate::ids::IdentifierError;

/// Input that can never be stored. Always recoverable by correcting the input.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid {field} {value:?}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub value: String,
    pub reason: ValidationReason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    #[error("{0}")]
    Identifier(#[from] IdentifierError),
    #[error("name is reserved")]
    Reserved,
    #[error("must not be empty")]
    Empty,
    #[error("not an email address")]
    Email,
    #[error("not an http(s) URL")]
    Url,
    #[error("{0}")]
    Grammar(#[from] GrammarError),
    #[error("{0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn new(field: impl Into<String>, value: impl Into<String>, reason: impl Into<ValidationReason>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The structured grammar failure, when the body was the problem.
    pub fn grammar(&self) -> Option<&GrammarError> {
        match &self.reason {
            ValidationReason::Grammar(err) => Some(err),
            _ => None,
        }
    }
}
