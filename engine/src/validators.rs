//! Validator registry and submission evaluation.
//!
//! Validator kinds are looked up by their `type` tag at evaluation time, so a
//! lab carrying an unknown kind still loads and starts; only its submissions
//! fail. New kinds are added with [`ValidatorRegistry::register`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::template::{RenderMode, render_with};
use crate::core::types::ResolvedParameters;
use crate::error::{LabError, LabResult};
use crate::io::staging::resolve_in_staging;
use crate::lab::ValidatorSpec;

pub const FLAG_CONTAINS: &str = "flag_contains";
pub const FILE_EXISTS: &str = "file_exists";

/// What a validator may look at besides the submission.
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub parameters: &'a ResolvedParameters,
    pub staging_dir: &'a Path,
    pub render_mode: RenderMode,
}

impl SessionContext<'_> {
    /// Render one of the spec's template fields against the session.
    pub fn render_field(&self, spec: &ValidatorSpec, field: &str) -> LabResult<String> {
        render_with(spec.str_field(field)?, self.parameters, self.render_mode)
    }
}

/// A pluggable validator kind.
pub trait Validator: Send + Sync {
    /// The `type` tag this validator answers to.
    fn kind(&self) -> &str;

    fn evaluate(
        &self,
        submission: &str,
        spec: &ValidatorSpec,
        ctx: &SessionContext<'_>,
    ) -> LabResult<bool>;
}

/// Passes when the trimmed submission contains the rendered `value`.
///
/// Fails closed if either side is empty after trimming.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagContains;

impl Validator for FlagContains {
    fn kind(&self) -> &str {
        FLAG_CONTAINS
    }

    fn evaluate(
        &self,
        submission: &str,
        spec: &ValidatorSpec,
        ctx: &SessionContext<'_>,
    ) -> LabResult<bool> {
        let expected = ctx.render_field(spec, "value")?;
        let (submission, expected) = (submission.trim(), expected.trim());
        if submission.is_empty() || expected.is_empty() {
            return Ok(false);
        }
        Ok(submission.contains(expected))
    }
}

/// Passes when the rendered `path` exists inside the staging directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExists;

impl Validator for FileExists {
    fn kind(&self) -> &str {
        FILE_EXISTS
    }

    fn evaluate(
        &self,
        _submission: &str,
        spec: &ValidatorSpec,
        ctx: &SessionContext<'_>,
    ) -> LabResult<bool> {
        let rendered = ctx.render_field(spec, "path")?;
        let path = resolve_in_staging(ctx.staging_dir, &rendered)?;
        Ok(path.exists())
    }
}

/// Rendered `path` of every `file_exists` validator, in declared order.
///
/// These become placeholder files when a session is staged.
pub fn file_exists_targets(
    validators: &[ValidatorSpec],
    parameters: &ResolvedParameters,
    mode: RenderMode,
) -> LabResult<Vec<String>> {
    validators
        .iter()
        .filter(|spec| spec.kind == FILE_EXISTS)
        .map(|spec| render_with(spec.str_field("path")?, parameters, mode))
        .collect()
}

/// Per-validator result, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
}

/// Aggregate of every validator of a lab (logical AND).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub outcomes: Vec<ValidatorOutcome>,
}

/// Type tag to validator. Cheap to clone.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<String, Arc<dyn Validator>>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ValidatorRegistry {
    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `flag_contains` and `file_exists`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(FlagContains).register(FileExists);
        registry
    }

    /// Add a kind, replacing any validator already registered under its tag.
    pub fn register<V: Validator + 'static>(&mut self, validator: V) -> &mut Self {
        self.validators
            .insert(validator.kind().to_string(), Arc::new(validator));
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn Validator>> {
        self.validators.get(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.validators.keys().map(String::as_str).collect()
    }

    /// Run every validator against `submission`.
    ///
    /// All tags are resolved before anything runs, so an unknown tag fails
    /// the submission without side effects. Every validator then runs, even
    /// after a failure or error; the first error (in declared order) is
    /// returned once all have finished. An empty list passes.
    #[instrument(skip_all, fields(validators = validators.len()))]
    pub fn evaluate(
        &self,
        validators: &[ValidatorSpec],
        submission: &str,
        ctx: &SessionContext<'_>,
    ) -> LabResult<Verdict> {
        let handlers = validators
            .iter()
            .map(|spec| {
                self.get(&spec.kind)
                    .map(|handler| (spec, handler))
                    .ok_or_else(|| LabError::UnknownValidatorType {
                        kind: spec.kind.clone(),
                    })
            })
            .collect::<LabResult<Vec<_>>>()?;

        let mut outcomes = Vec::with_capacity(handlers.len());
        let mut first_error = None;
        for (index, (spec, handler)) in handlers.into_iter().enumerate() {
            match handler.evaluate(submission, spec, ctx) {
                Ok(passed) => {
                    debug!(index, kind = %spec.kind, passed, "validator result");
                    outcomes.push(ValidatorOutcome {
                        kind: spec.kind.clone(),
                        passed,
                    });
                }
                Err(err) => {
                    warn!(index, kind = %spec.kind, error = %err, "validator errored");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        let passed = outcomes.iter().all(|outcome| outcome.passed);
        Ok(Verdict { passed, outcomes })
    }
}
