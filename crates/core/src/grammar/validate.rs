#![forbid(unsafe_code)]

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{
    Alternative, FindStep, GrammarError, GrammarErrorKind, Instruction, InstructionPath, LoadStep,
    Method, Posts, SequenceItem, StepCommon,
};

/// Maximum nesting of `then`, `extends`, sequences and `metadata` below the root.
pub const MAX_NESTING: usize = 64;

const COMMON_FIELDS: &[&str] = &["name", "description", "metadata", "then", "extends"];
const LOAD_FIELDS: &[&str] = &["load", "method", "posts", "headers", "cookies"];
const FIND_FIELDS: &[&str] = &[
    "find",
    "case_insensitive",
    "multiline",
    "dot_matches_all",
    "replace",
    "match",
    "min",
    "max",
];

pub(super) fn instruction(value: &Value) -> Result<Instruction, GrammarError> {
    parse_instruction(value, &InstructionPath::root(), 0)
}

fn parse_instruction(
    value: &Value,
    path: &InstructionPath,
    depth: usize,
) -> Result<Instruction, GrammarError> {
    ensure_depth(path, depth, Alternative::Instruction)?;
    match value {
        Value::String(reference) => Ok(Instruction::Reference(reference.clone())),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(parse_sequence_item(item, &path.index(index), depth + 1)?);
            }
            Ok(Instruction::Sequence(out))
        }
        Value::Object(fields) => Ok(match parse_step(fields, path, depth)? {
            Step::Load(step) => Instruction::Load(Box::new(step)),
            Step::Find(step) => Instruction::Find(Box::new(step)),
        }),
        other => Err(GrammarError::new(
            GrammarErrorKind::NotAnInstruction {
                found: json_type(other),
            },
            path,
            Alternative::Instruction,
        )),
    }
}

fn parse_sequence_item(
    value: &Value,
    path: &InstructionPath,
    depth: usize,
) -> Result<SequenceItem, GrammarError> {
    ensure_depth(path, depth, Alternative::SequenceItem)?;
    match value {
        Value::String(reference) => Ok(SequenceItem::Reference(reference.clone())),
        Value::Array(_) => Err(GrammarError::new(
            GrammarErrorKind::NestedSequence,
            path,
            Alternative::SequenceItem,
        )),
        Value::Object(fields) => Ok(match parse_step(fields, path, depth)? {
            Step::Load(step) => SequenceItem::Load(Box::new(step)),
            Step::Find(step) => SequenceItem::Find(Box::new(step)),
        }),
        other => Err(GrammarError::new(
            GrammarErrorKind::NotAnInstruction {
                found: json_type(other),
            },
            path,
            Alternative::SequenceItem,
        )),
    }
}

enum Step {
    Load(LoadStep),
    Find(FindStep),
}

fn parse_step(
    fields: &Map<String, Value>,
    path: &InstructionPath,
    depth: usize,
) -> Result<Step, GrammarError> {
    let has_load_fields = fields.keys().any(|key| LOAD_FIELDS.contains(&key.as_str()));
    let has_find_fields = fields.keys().any(|key| FIND_FIELDS.contains(&key.as_str()));

    if has_load_fields && has_find_fields {
        return Err(GrammarError::new(
            GrammarErrorKind::AmbiguousStep,
            path,
            Alternative::Step,
        ));
    }

    let alternative = if has_load_fields {
        Alternative::LoadStep
    } else if has_find_fields {
        Alternative::FindStep
    } else {
        Alternative::Step
    };

    // Closed schema.
    if let Some(field) = fields.keys().find(|key| {
        let key = key.as_str();
        !COMMON_FIELDS.contains(&key) && !LOAD_FIELDS.contains(&key) && !FIND_FIELDS.contains(&key)
    }) {
        return Err(GrammarError::new(
            GrammarErrorKind::UnknownField {
                field: field.clone(),
            },
            path,
            alternative,
        ));
    }

    let common = parse_common(fields, path, depth, alternative)?;

    if has_load_fields {
        return parse_load(fields, common, path).map(Step::Load);
    }
    if has_find_fields || common.extends.is_some() {
        // A bare `extends` is read as a find step, the first alternative the
        // inheritance form is tried against.
        return parse_find(fields, common, path).map(Step::Find);
    }

    Err(GrammarError::new(
        GrammarErrorKind::MissingTarget,
        path,
        Alternative::Step,
    ))
}

fn parse_common(
    fields: &Map<String, Value>,
    path: &InstructionPath,
    depth: usize,
    alternative: Alternative,
) -> Result<StepCommon, GrammarError> {
    let then = fields
        .get("then")
        .map(|value| parse_instruction(value, &path.field("then"), depth + 1))
        .transpose()?;
    let extends = fields
        .get("extends")
        .map(|value| parse_instruction(value, &path.field("extends"), depth + 1))
        .transpose()?;

    Ok(StepCommon {
        name: optional_string(fields, "name", path, alternative)?,
        description: optional_string(fields, "description", path, alternative)?,
        metadata: match fields.get("metadata") {
            None => None,
            Some(Value::Object(map)) => {
                ensure_value_depth(map, &path.field("metadata"), depth + 1, alternative)?;
                Some(map.clone())
            }
            Some(_) => return Err(wrong_type("metadata", "an object", path, alternative)),
        },
        then,
        extends,
    })
}

fn parse_load(
    fields: &Map<String, Value>,
    common: StepCommon,
    path: &InstructionPath,
) -> Result<LoadStep, GrammarError> {
    let alternative = Alternative::LoadStep;
    let load = optional_string(fields, "load", path, alternative)?;
    if load.is_none() && common.extends.is_none() {
        return Err(GrammarError::new(
            GrammarErrorKind::MissingField { field: "load" },
            path,
            alternative,
        ));
    }

    let method = match optional_string(fields, "method", path, alternative)? {
        None => None,
        Some(raw) => Some(Method::parse(&raw).ok_or_else(|| {
            GrammarError::new(
                GrammarErrorKind::InvalidMethod { found: raw.clone() },
                &path.field("method"),
                alternative,
            )
        })?),
    };

    let posts = match fields.get("posts") {
        None => None,
        Some(Value::String(raw)) => Some(Posts::Raw(raw.clone())),
        Some(Value::Object(map)) => Some(Posts::Form(string_map(
            map,
            "posts",
            &path.field("posts"),
            alternative,
        )?)),
        Some(_) => {
            return Err(wrong_type(
                "posts",
                "a string or an object of strings",
                path,
                alternative,
            ));
        }
    };

    Ok(LoadStep {
        common,
        load,
        method,
        posts,
        headers: optional_string_map(fields, "headers", path, alternative)?,
        cookies: optional_string_map(fields, "cookies", path, alternative)?,
    })
}

fn parse_find(
    fields: &Map<String, Value>,
    common: StepCommon,
    path: &InstructionPath,
) -> Result<FindStep, GrammarError> {
    let alternative = Alternative::FindStep;
    let find = optional_string(fields, "find", path, alternative)?;
    if find.is_none() && common.extends.is_none() {
        return Err(GrammarError::new(
            GrammarErrorKind::MissingField { field: "find" },
            path,
            alternative,
        ));
    }

    let match_index = optional_integer(fields, "match", path, alternative)?;
    let min = optional_integer(fields, "min", path, alternative)?;
    let max = optional_integer(fields, "max", path, alternative)?;
    if match_index.is_some() && (min.is_some() || max.is_some()) {
        return Err(GrammarError::new(
            GrammarErrorKind::MatchWithRange,
            path,
            alternative,
        ));
    }

    Ok(FindStep {
        common,
        find,
        case_insensitive: optional_bool(fields, "case_insensitive", path, alternative)?,
        multiline: optional_bool(fields, "multiline", path, alternative)?,
        dot_matches_all: optional_bool(fields, "dot_matches_all", path, alternative)?,
        replace: optional_string(fields, "replace", path, alternative)?,
        match_index,
        min,
        max,
    })
}

fn ensure_depth(
    path: &InstructionPath,
    depth: usize,
    alternative: Alternative,
) -> Result<(), GrammarError> {
    if depth > MAX_NESTING {
        return Err(GrammarError::new(
            GrammarErrorKind::TooDeep { limit: MAX_NESTING },
            path,
            alternative,
        ));
    }
    Ok(())
}

/// Free-form JSON shares the nesting budget with the steps around it.
fn ensure_value_depth(
    map: &Map<String, Value>,
    path: &InstructionPath,
    depth: usize,
    alternative: Alternative,
) -> Result<(), GrammarError> {
    ensure_depth(path, depth, alternative)?;
    let mut pending: Vec<(&Value, usize)> = map.values().map(|value| (value, depth + 1)).collect();
    while let Some((value, level)) = pending.pop() {
        match value {
            Value::Array(items) => {
                ensure_depth(path, level, alternative)?;
                pending.extend(items.iter().map(|item| (item, level + 1)));
            }
            Value::Object(fields) => {
                ensure_depth(path, level, alternative)?;
                pending.extend(fields.values().map(|item| (item, level + 1)));
            }
            _ => {}
        }
    }
    Ok(())
}

fn optional_string(
    fields: &Map<String, Value>,
    field: &str,
    path: &InstructionPath,
    alternative: Alternative,
) -> Result<Option<String>, GrammarError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(wrong_type(field, "a string", path, alternative)),
    }
}

fn optional_bool(
    fields: &Map<String, Value>,
    field: &str,
    path: &InstructionPath,
    alternative: Alternative,
) -> Result<Option<bool>, GrammarError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(wrong_type(field, "a boolean", path, alternative)),
    }
}

fn optional_integer(
    fields: &Map<String, Value>,
    field: &str,
    path: &InstructionPath,
    alternative: Alternative,
) -> Result<Option<i64>, GrammarError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::Number(number)) => number
            .as_i64()
            .map(Some)
            .ok_or_else(|| wrong_type(field, "an integer", path, alternative)),
        Some(_) => Err(wrong_type(field, "an integer", path, alternative)),
    }
}

fn optional_string_map(
    fields: &Map<String, Value>,
    field: &str,
    path: &InstructionPath,
    alternative: Alternative,
) -> Result<Option<BTreeMap<String, String>>, GrammarError> {
    match fields.get(field) {
        None => Ok(None),
        Some(Value::Object(map)) => {
            string_map(map, field, &path.field(field), alternative).map(Some)
        }
        Some(_) => Err(wrong_type(field, "an object of strings", path, alternative)),
    }
}

fn string_map(
    map: &Map<String, Value>,
    field: &str,
    path: &InstructionPath,
    alternative: Alternative,
) -> Result<BTreeMap<String, String>, GrammarError> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        let Value::String(value) = value else {
            return Err(GrammarError::new(
                GrammarErrorKind::WrongType {
                    field: format!("{field}.{key}"),
                    expected: "a string",
                },
                &path.field(key),
                alternative,
            ));
        };
        out.insert(key.clone(), value.clone());
    }
    Ok(out)
}

fn wrong_type(
    field: &str,
    expected: &'static str,
    path: &InstructionPath,
    alternative: Alternative,
) -> GrammarError {
    GrammarError::new(
        GrammarErrorKind::WrongType {
            field: field.to_string(),
            expected,
        },
        &path.field(field),
        alternative,
    )
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
