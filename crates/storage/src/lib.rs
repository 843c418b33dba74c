#![forbid(unsafe_code)]

//! SQLite-backed account and instruction registries, plus a SQLite adapter
//! for the instruction version history.

mod store;

pub use store::*;
