#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Account names that collide with top-level routes of the serving layer.
pub const RESERVED_ACCOUNT_NAMES: &[&str] = &["oauth", "instructions", "users", "proxy"];

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }

            pub fn try_new(value: impl Into<String>) -> Result<Self, OpaqueIdError> {
                let value = value.into();
                validate_opaque_id(&value)?;
                Ok(Self(value))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(AccountId);
opaque_id!(InstructionId);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OpaqueIdError {
    #[error("id must not be empty")]
    Empty,
    #[error("id is too long")]
    TooLong,
    #[error("id must not contain '/'")]
    ContainsSlash,
    #[error("id contains whitespace or control characters")]
    ContainsControl,
}

fn validate_opaque_id(value: &str) -> Result<(), OpaqueIdError> {
    if value.is_empty() {
        return Err(OpaqueIdError::Empty);
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(OpaqueIdError::TooLong);
    }
    // '/' separates the two halves of a history key.
    if value.contains('/') {
        return Err(OpaqueIdError::ContainsSlash);
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(OpaqueIdError::ContainsControl);
    }
    Ok(())
}

/// A name usable as a URL path segment: account names, instruction names and tags.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    pub fn is_reserved_account_name(&self) -> bool {
        RESERVED_ACCOUNT_NAMES.contains(&self.0.as_str())
    }
}

impl TryFrom<String> for Identifier {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("must not be empty")]
    Empty,
    #[error("must be at most 128 characters")]
    TooLong,
    #[error("invalid character {ch:?} at index {index}")]
    InvalidChar { ch: char, index: usize },
}

fn validate_identifier(value: &str) -> Result<(), IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-') {
            continue;
        }
        return Err(IdentifierError::InvalidChar { ch, index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert_eq!(Identifier::try_new("").unwrap_err(), IdentifierError::Empty);
        assert_eq!(
            Identifier::try_new("has space").unwrap_err(),
            IdentifierError::InvalidChar { ch: ' ', index: 3 }
        );
        assert_eq!(
            Identifier::try_new("joe@example.com").unwrap_err(),
            IdentifierError::InvalidChar { ch: '@', index: 3 }
        );
        assert_eq!(
            Identifier::try_new("x".repeat(129)).unwrap_err(),
            IdentifierError::TooLong
        );
        assert!(Identifier::try_new("staten-island").is_ok());
        assert!(Identifier::try_new("acris_index_2").is_ok());
        assert!(Identifier::try_new("10026").is_ok());
    }

    #[test]
    fn reserved_account_names_are_flagged() {
        for name in RESERVED_ACCOUNT_NAMES {
            let id = Identifier::try_new(*name).expect("reserved words are still identifiers");
            assert!(id.is_reserved_account_name());
        }
        let joe = Identifier::try_new("joe").expect("identifier");
        assert!(!joe.is_reserved_account_name());
    }

    #[test]
    fn opaque_ids_reject_key_separator() {
        assert_eq!(AccountId::try_new("").unwrap_err(), OpaqueIdError::Empty);
        assert_eq!(
            InstructionId::try_new("a/b").unwrap_err(),
            OpaqueIdError::ContainsSlash
        );
        assert_eq!(
            InstructionId::try_new("a b").unwrap_err(),
            OpaqueIdError::ContainsControl
        );
        assert_eq!(
            AccountId::try_new("3f2c9a1e").expect("account id").as_str(),
            "3f2c9a1e"
        );
    }
}
