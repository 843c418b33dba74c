#![forbid(unsafe_code)]

//! The recursive instruction grammar:
//!
//! ```text
//! Instruction  := string | SequenceItem[] | LoadStep | FindStep
//! SequenceItem := string | LoadStep | FindStep
//! ```
//!
//! `then` and `extends` on either step kind are full instructions. A step
//! carrying `extends` may omit its otherwise-required `load` or `find`;
//! inheritance is never resolved here.

mod error;
mod types;
mod validate;

pub use error::*;
pub use types::*;
pub use validate::MAX_NESTING;
