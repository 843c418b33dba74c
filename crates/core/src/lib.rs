#![forbid(unsafe_code)]

pub mod error;
pub mod grammar;
pub mod ids;
pub mod model;

pub use error::{ValidationError, ValidationReason};
pub use grammar::{
    FindStep, GrammarError, GrammarErrorKind, Instruction, LoadStep, MAX_NESTING, Method, Posts,
    Selection, SequenceItem,
};
pub use ids::{AccountId, Identifier, InstructionId};
pub use model::{Account, InstructionDocument, NewAccount, ProviderInfo, Signature};
