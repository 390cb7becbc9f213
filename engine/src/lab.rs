//! Lab definition files.
//!
//! A lab is one `lab.yaml` / `lab.toml` per catalog directory. Loading checks
//! the document against `schemas/lab/v1.schema.json`, then applies semantic
//! checks. Parameter and validator *types* are not checked here: an unknown
//! parameter type fails when a session resolves parameters, an unknown
//! validator type fails when a submission is evaluated.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LabError, LabResult};

const LAB_SCHEMA: &str = include_str!("../../schemas/lab/v1.schema.json");

/// Definition file names, in lookup order.
pub const DEFINITION_FILES: [&str; 3] = ["lab.yaml", "lab.yml", "lab.toml"];

/// Immutable lab definition as authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabDefinition {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub seeded: bool,
    /// Service name to image/template reference.
    #[serde(default)]
    pub topology: BTreeMap<String, String>,
    /// Artifact name to template; rendered into `<name>.txt`.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub validators: Vec<ValidatorSpec>,
    #[serde(default)]
    pub hints: Vec<String>,
    #[serde(default)]
    pub cleanup: bool,
}

/// A parameter as written in the definition. Bounds are checked at resolve time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `random_hex`, `random_int` or `choice`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl ParameterSpec {
    /// Declared name, or `param_<index>` when the spec is unnamed.
    pub fn resolved_name(&self, index: usize) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("param_{index}"),
        }
    }
}

/// A validator entry: a type tag plus type-specific template fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ValidatorSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// A required string field, e.g. `value` for `flag_contains`.
    pub fn str_field(&self, field: &str) -> LabResult<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| LabError::MissingValidatorField {
                kind: self.kind.clone(),
                field: field.to_string(),
            })
    }
}

/// Serialization format of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Toml,
}

impl DefinitionFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Some(Self::Yaml),
            Some("toml") => Some(Self::Toml),
            _ => None,
        }
    }
}

impl LabDefinition {
    /// Load and validate a definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let format = DefinitionFormat::from_path(path)
            .ok_or_else(|| anyhow!("unsupported lab file {}", path.display()))?;
        let contents =
            fs::read_to_string(path).with_context(|| format!("read lab {}", path.display()))?;
        Self::parse_str(&contents, format).with_context(|| format!("load lab {}", path.display()))
    }

    /// Parse and validate definition text (schema + semantic checks).
    pub fn parse_str(contents: &str, format: DefinitionFormat) -> Result<Self> {
        let document: Value = match format {
            DefinitionFormat::Yaml => serde_yaml::from_str(contents).context("parse yaml")?,
            DefinitionFormat::Toml => toml::from_str(contents).context("parse toml")?,
        };
        validate_schema(&document)?;
        let lab: LabDefinition =
            serde_json::from_value(document).context("deserialize lab definition")?;
        lab.validate()?;
        Ok(lab)
    }

    fn validate(&self) -> Result<()> {
        validate_lab_id(&self.id)?;
        if self.title.trim().is_empty() {
            bail!("title must be non-empty");
        }
        let mut names = BTreeSet::new();
        for (index, spec) in self.parameters.iter().enumerate() {
            let name = spec.resolved_name(index);
            if !names.insert(name.clone()) {
                bail!("parameters[{index}]: duplicate parameter name {name}");
            }
        }
        for (index, validator) in self.validators.iter().enumerate() {
            if validator.kind.trim().is_empty() {
                bail!("validators[{index}]: type must be non-empty");
            }
        }
        Ok(())
    }
}

fn validate_schema(document: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(LAB_SCHEMA).context("parse lab schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid lab schema: {}", err))?;
    let messages: Vec<String> = compiled
        .iter_errors(document)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("lab schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn validate_lab_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("id must be non-empty");
    }
    if id.contains('/') || id.contains('\\') {
        bail!("id must not contain path separators");
    }
    if id.contains("..") {
        bail!("id must not contain '..'");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("id must use [a-z0-9_-] only");
    }
    Ok(())
}
