//! Pull JSON objects out of free-form model output.

use std::borrow::Cow;

use serde::Serialize;
use serde_json::{Deserializer, Value};
use thiserror::Error;

const REQUIRED_KEYS: [&str; 3] = ["short_description", "description", "assignment_group"];

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("malformed JSON at byte {offset}: {reason}")]
pub struct ExtractionError {
    pub offset: usize,
    pub reason: String,
}

/// Objects decoded before the scan stopped, and why it stopped early
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub objects: Vec<Value>,
    pub error: Option<ExtractionError>,
}

/// A task suggestion with the three required keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedSuggestion {
    pub short_description: String,
    pub description: String,
    pub assignment_group: String,
}

impl ExtractedSuggestion {
    /// Fails with the name of the first missing key
    pub fn from_value(value: &Value) -> Result<Self, &'static str> {
        let field = |key: &'static str| value.get(key).map(value_to_text).ok_or(key);

        Ok(Self {
            short_description: field(REQUIRED_KEYS[0])?,
            description: field(REQUIRED_KEYS[1])?,
            assignment_group: field(REQUIRED_KEYS[2])?,
        })
    }
}

/// Render a JSON value as plain text; arrays become one line per element
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Contents of ``` fenced blocks, or the whole text when there are none
pub fn strip_code_fences(text: &str) -> Cow<'_, str> {
    if !text.lines().any(|line| line.trim_start().starts_with("```")) {
        return Cow::Borrowed(text);
    }

    let mut inside = false;
    let mut kept = Vec::new();
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            inside = !inside;
        } else if inside {
            kept.push(line);
        }
    }
    Cow::Owned(kept.join("\n").trim().to_string())
}

/// Decode every JSON value that starts at a `{`, left to right.
///
/// After a successful decode the scan resumes just past the value, so nested
/// objects are never yielded twice. The first malformed span stops the scan;
/// whatever was decoded before it is kept.
pub fn extract_json_objects(text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let mut cursor = 0;

    while let Some(found) = text[cursor..].find('{') {
        let start = cursor + found;
        let mut stream = Deserializer::from_str(&text[start..]).into_iter::<Value>();

        match stream.next() {
            Some(Ok(value)) => {
                extraction.objects.push(value);
                cursor = start + stream.byte_offset();
            }
            Some(Err(e)) => {
                extraction.error = Some(ExtractionError {
                    offset: start,
                    reason: e.to_string(),
                });
                break;
            }
            None => break,
        }
    }

    extraction
}

/// Extract from fenced blocks when they hold any object, else from the whole reply.
///
/// Fences often carry shell snippets rather than the JSON itself, so an empty
/// fenced scan never hides objects written in plain text.
pub fn extract_from_reply(reply: &str) -> Extraction {
    let fenced = strip_code_fences(reply);
    if let Cow::Owned(inner) = &fenced {
        let extraction = extract_json_objects(inner);
        if !extraction.objects.is_empty() {
            return extraction;
        }
    }
    extract_json_objects(reply)
}
