#![forbid(unsafe_code)]

use instr_core::{ValidationError, ValidationReason};
use serde_json::Value;

/// Input to `save_or_create_instruction`. Nothing here is trusted yet.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveInstructionRequest {
    pub name: String,
    pub instruction: Value,
    pub tags: Vec<String>,
}

impl SaveInstructionRequest {
    pub fn new(name: impl Into<String>, instruction: Value, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            instruction,
            tags,
        }
    }

    /// Builds a request from the raw JSON strings a caller received over the wire.
    pub fn from_raw(
        name: impl Into<String>,
        instruction_json: &str,
        tags_json: &str,
    ) -> Result<Self, ValidationError> {
        let instruction: Value = serde_json::from_str(instruction_json).map_err(|err| {
            ValidationError::new(
                "instruction",
                instruction_json,
                ValidationReason::Malformed(format!("invalid JSON: {err}")),
            )
        })?;

        let tags: Value = serde_json::from_str(tags_json).map_err(|err| {
            ValidationError::new(
                "tags",
                tags_json,
                ValidationReason::Malformed(format!("invalid JSON: {err}")),
            )
        })?;
        let Value::Array(items) = tags else {
            return Err(ValidationError::new(
                "tags",
                tags_json,
                ValidationReason::Malformed("tags must be an array of strings".to_string()),
            ));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let Value::String(tag) = item else {
                return Err(ValidationError::new(
                    "tags",
                    item.to_string(),
                    ValidationReason::Malformed("tags must be an array of strings".to_string()),
                ));
            };
            out.push(tag);
        }

        Ok(Self::new(name, instruction, out))
    }
}
