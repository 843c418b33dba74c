#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationReason};
use crate::grammar::Instruction;
use crate::ids::{AccountId, Identifier, InstructionId};

/// Identity-provider metadata attached to an account at signup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider: String,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_img: Option<String>,
    /// Display name as given by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
}

impl ProviderInfo {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.provider.trim().is_empty() {
            return Err(ValidationError::new("provider", &self.provider, ValidationReason::Empty));
        }
        for (field, value) in [
            ("provider_url", self.provider_url.as_deref()),
            ("provider_img", self.provider_img.as_deref()),
        ] {
            if let Some(value) = value {
                if !is_http_url(value) {
                    return Err(ValidationError::new(field, value, ValidationReason::Url));
                }
            }
        }
        Ok(())
    }
}

/// Signup input, checked in full before any write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub provider: ProviderInfo,
}

impl NewAccount {
    pub fn validate(&self) -> Result<Identifier, ValidationError> {
        let name = account_name(&self.name)?;
        if !is_email(&self.email) {
            return Err(ValidationError::new("email", &self.email, ValidationReason::Email));
        }
        self.provider.validate()?;
        Ok(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: Identifier,
    pub email: String,
    #[serde(flatten)]
    pub provider: ProviderInfo,
    pub deleted: bool,
    pub created_at_ms: i64,
}

impl Account {
    /// The author recorded on history commits made on this account's behalf.
    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.as_str().to_string(),
            email: self.name.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

/// A stored instruction: `{id, creator_id, name, tags, instruction}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstructionDocument {
    pub id: InstructionId,
    pub creator_id: AccountId,
    pub name: Identifier,
    pub tags: Vec<Identifier>,
    pub instruction: Instruction,
}

impl InstructionDocument {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.as_str() == tag)
    }

    pub fn tag_strs(&self) -> Vec<&str> {
        self.tags.iter().map(Identifier::as_str).collect()
    }
}

pub fn account_name(raw: &str) -> Result<Identifier, ValidationError> {
    let name = identifier("name", raw)?;
    if name.is_reserved_account_name() {
        return Err(ValidationError::new("name", raw, ValidationReason::Reserved));
    }
    Ok(name)
}

pub fn identifier(field: &str, raw: &str) -> Result<Identifier, ValidationError> {
    Identifier::try_new(raw).map_err(|err| ValidationError::new(field, raw, err))
}

/// Validates tags and drops repeats, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<Identifier>, ValidationError> {
    let mut out: Vec<Identifier> = Vec::with_capacity(tags.len());
    for raw in tags {
        let tag = identifier("tags", raw)?;
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

fn is_email(value: &str) -> bool {
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_http_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}
