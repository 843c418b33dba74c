#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{GrammarError, validate};

pub const DEFAULT_REPLACE: &str = "$0";
pub const DEFAULT_MIN: i64 = 0;
pub const DEFAULT_MAX: i64 = -1;

/// An instruction body.
///
/// Validated on construction from JSON; a value of this type is always a
/// member of the instruction grammar. `extends` is kept unresolved.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Instruction {
    /// A reference to another instruction, resolved by the execution engine.
    Reference(String),
    Sequence(Vec<SequenceItem>),
    Load(Box<LoadStep>),
    Find(Box<FindStep>),
}

/// An element of a sequence. Sequences never nest directly.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SequenceItem {
    Reference(String),
    Load(Box<LoadStep>),
    Find(Box<FindStep>),
}

impl Instruction {
    /// Parses and validates a JSON candidate.
    pub fn from_value(value: &Value) -> Result<Self, GrammarError> {
        validate::instruction(value)
    }

    /// Grammar membership test without keeping the parsed form.
    pub fn validate(value: &Value) -> Result<(), GrammarError> {
        validate::instruction(value).map(|_| ())
    }

    pub fn from_json_str(raw: &str) -> Result<Self, InstructionParseError> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(Self::from_value(&value)?)
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Reference(reference) => Value::String(reference.clone()),
            Self::Sequence(items) => Value::Array(items.iter().map(SequenceItem::to_value).collect()),
            Self::Load(step) => step.to_value(),
            Self::Find(step) => step.to_value(),
        }
    }

    pub fn to_json_string(&self) -> String {
        self.to_value().to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reference(_) => "reference",
            Self::Sequence(_) => "sequence",
            Self::Load(_) => "load",
            Self::Find(_) => "find",
        }
    }
}

impl SequenceItem {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Reference(reference) => Value::String(reference.clone()),
            Self::Load(step) => step.to_value(),
            Self::Find(step) => step.to_value(),
        }
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InstructionParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

/// Fields legal on every step.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepCommon {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub then: Option<Instruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<Instruction>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Head,
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Head => "head",
            Method::Get => "get",
            Method::Post => "post",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "head" => Some(Method::Head),
            "get" => Some(Method::Get),
            "post" => Some(Method::Post),
            _ => None,
        }
    }
}

/// Post data: a raw body or form fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Posts {
    Raw(String),
    Form(BTreeMap<String, String>),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LoadStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<Posts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<BTreeMap<String, String>>,
}

impl LoadStep {
    /// The retrieval target. `None` only on steps that inherit it through `extends`.
    pub fn target(&self) -> Option<&str> {
        self.load.as_deref()
    }

    pub fn inherits(&self) -> bool {
        self.common.extends.is_some()
    }

    pub fn to_value(&self) -> Value {
        let mut out = self.common.to_map();
        insert_string(&mut out, "load", self.load.as_deref());
        if let Some(method) = self.method {
            out.insert("method".to_string(), Value::String(method.as_str().to_string()));
        }
        match &self.posts {
            None => {}
            Some(Posts::Raw(raw)) => {
                out.insert("posts".to_string(), Value::String(raw.clone()));
            }
            Some(Posts::Form(fields)) => {
                out.insert("posts".to_string(), string_map_value(fields));
            }
        }
        if let Some(headers) = &self.headers {
            out.insert("headers".to_string(), string_map_value(headers));
        }
        if let Some(cookies) = &self.cookies {
            out.insert("cookies".to_string(), string_map_value(cookies));
        }
        Value::Object(out)
    }
}

/// Which matches of a pattern feed the replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    Single(i64),
    Range { min: i64, max: i64 },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FindStep {
    #[serde(flatten)]
    pub common: StepCommon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_insensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dot_matches_all: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace: Option<String>,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_index: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl FindStep {
    /// The pattern. `None` only on steps that inherit it through `extends`.
    pub fn pattern(&self) -> Option<&str> {
        self.find.as_deref()
    }

    pub fn inherits(&self) -> bool {
        self.common.extends.is_some()
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive.unwrap_or(false)
    }

    pub fn multiline(&self) -> bool {
        self.multiline.unwrap_or(false)
    }

    pub fn dot_matches_all(&self) -> bool {
        self.dot_matches_all.unwrap_or(true)
    }

    pub fn replace(&self) -> &str {
        self.replace.as_deref().unwrap_or(DEFAULT_REPLACE)
    }

    /// Zero and positive indices count forward from the first match, negative
    /// indices count back from the last (-1 is last).
    pub fn selection(&self) -> Selection {
        match self.match_index {
            Some(index) => Selection::Single(index),
            None => Selection::Range {
                min: self.min.unwrap_or(DEFAULT_MIN),
                max: self.max.unwrap_or(DEFAULT_MAX),
            },
        }
    }

    pub fn to_value(&self) -> Value {
        let mut out = self.common.to_map();
        insert_string(&mut out, "find", self.find.as_deref());
        for (field, flag) in [
            ("case_insensitive", self.case_insensitive),
            ("multiline", self.multiline),
            ("dot_matches_all", self.dot_matches_all),
        ] {
            if let Some(flag) = flag {
                out.insert(field.to_string(), Value::Bool(flag));
            }
        }
        insert_string(&mut out, "replace", self.replace.as_deref());
        for (field, number) in [("match", self.match_index), ("min", self.min), ("max", self.max)] {
            if let Some(number) = number {
                out.insert(field.to_string(), Value::from(number));
            }
        }
        Value::Object(out)
    }
}

impl StepCommon {
    fn to_map(&self) -> Map<String, Value> {
        let mut out = Map::new();
        insert_string(&mut out, "name", self.name.as_deref());
        insert_string(&mut out, "description", self.description.as_deref());
        if let Some(metadata) = &self.metadata {
            out.insert("metadata".to_string(), Value::Object(metadata.clone()));
        }
        if let Some(then) = &self.then {
            out.insert("then".to_string(), then.to_value());
        }
        if let Some(extends) = &self.extends {
            out.insert("extends".to_string(), extends.to_value());
        }
        out
    }
}

fn insert_string(out: &mut Map<String, Value>, field: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.insert(field.to_string(), Value::String(value.to_string()));
    }
}

fn string_map_value(fields: &BTreeMap<String, String>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect(),
    )
}
