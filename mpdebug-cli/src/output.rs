//! Rendering of command results on stdout

use serde::Serialize;
use serde_json::Value;

/// What a command prints: a plain string, or a value shown as indented JSON
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Raw(String),
    Json(Value),
}

impl Output {
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Output::Json(serde_json::to_value(value)?))
    }

    pub fn render(&self) -> serde_json::Result<String> {
        match self {
            Output::Raw(s) => Ok(s.clone()),
            Output::Json(v) => serde_json::to_string_pretty(v),
        }
    }
}
