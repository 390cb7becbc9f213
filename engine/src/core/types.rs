//! Shared deterministic types for lab sessions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved parameter entry holding the raw session seed.
pub const SEED_KEY: &str = "SEED";

/// A resolved parameter value.
///
/// Serialized untagged so a snapshot reads as a plain JSON object
/// (`{"FLAG_ID":"3fa1c09e","PORT":8081}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Parameter name to value, always including [`SEED_KEY`].
///
/// Backed by a `BTreeMap` so serialization is byte-stable for a given seed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedParameters(BTreeMap<String, ParamValue>);

impl ResolvedParameters {
    pub fn with_seed(seed: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert(SEED_KEY.to_string(), ParamValue::Text(seed.to_string()));
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn seed(&self) -> Option<&str> {
        match self.0.get(SEED_KEY) {
            Some(ParamValue::Text(seed)) => Some(seed),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, name: String, value: ParamValue) {
        self.0.insert(name, value);
    }
}

/// Session lifecycle: `running -> passed | failed`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Passed,
    Failed,
}

impl SessionStatus {
    pub fn from_verdict(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_as_flat_object() {
        let mut params = ResolvedParameters::with_seed("abcd");
        params.insert("PORT".to_string(), ParamValue::Int(8081));
        params.insert("FLAG_ID".to_string(), ParamValue::Text("3fa1c09e".to_string()));

        let json = serde_json::to_string(&params).expect("serialize");
        assert_eq!(json, r#"{"FLAG_ID":"3fa1c09e","PORT":8081,"SEED":"abcd"}"#);

        let parsed: ResolvedParameters = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, params);
        assert_eq!(parsed.seed(), Some("abcd"));
    }

    #[test]
    fn status_is_terminal_after_verdict() {
        assert!(!SessionStatus::Running.is_terminal());
        assert_eq!(SessionStatus::from_verdict(true), SessionStatus::Passed);
        assert!(SessionStatus::from_verdict(false).is_terminal());
        assert_eq!(
            serde_json::to_string(&SessionStatus::Failed).expect("serialize"),
            "\"failed\""
        );
    }
}
