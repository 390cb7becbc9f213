//! Parameter resolution: lab parameter specs + seed -> named values.

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::derive::{derive, derive_u128};
use crate::core::types::{ParamValue, ResolvedParameters, SEED_KEY};
use crate::error::{LabError, LabResult};
use crate::lab::{LabDefinition, ParameterSpec};

/// Hex digits drawn for `random_int`.
const INT_HEX_LEN: usize = 12;
/// Hex digits drawn for `choice`.
const CHOICE_HEX_LEN: usize = 8;
/// Upper bound on `random_hex` lengths.
const MAX_HEX_LEN: u64 = 4096;

/// Typed view of a [`ParameterSpec`] once its bounds have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind<'a> {
    RandomHex { length: usize },
    RandomInt { min: i64, max: i64 },
    Choice { choices: &'a [String] },
}

impl<'a> ParamKind<'a> {
    /// Check a raw spec. `name` is the resolved (possibly positional) name.
    pub fn parse(name: &str, spec: &'a ParameterSpec) -> LabResult<Self> {
        match spec.kind.as_str() {
            "random_hex" => {
                let length = spec.length.ok_or_else(|| LabError::MissingParameterBound {
                    name: name.to_string(),
                    field: "length",
                })?;
                if length == 0 {
                    return Err(LabError::InvalidParameterBound {
                        name: name.to_string(),
                        reason: "length must be > 0".to_string(),
                    });
                }
                if length > MAX_HEX_LEN {
                    return Err(LabError::InvalidParameterBound {
                        name: name.to_string(),
                        reason: format!("length {length} exceeds {MAX_HEX_LEN}"),
                    });
                }
                Ok(Self::RandomHex {
                    length: length as usize,
                })
            }
            "random_int" => {
                let min = spec.min.ok_or_else(|| LabError::MissingParameterBound {
                    name: name.to_string(),
                    field: "min",
                })?;
                let max = spec.max.ok_or_else(|| LabError::MissingParameterBound {
                    name: name.to_string(),
                    field: "max",
                })?;
                if min > max {
                    return Err(LabError::InvalidParameterBound {
                        name: name.to_string(),
                        reason: format!("min {min} exceeds max {max}"),
                    });
                }
                Ok(Self::RandomInt { min, max })
            }
            "choice" => match spec.choices.as_deref() {
                Some(choices) if !choices.is_empty() => Ok(Self::Choice { choices }),
                _ => Err(LabError::InvalidChoiceSpec {
                    name: name.to_string(),
                }),
            },
            other => Err(LabError::UnsupportedParameterType {
                name: name.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    fn generate(&self, seed: &str, name: &str) -> ParamValue {
        match self {
            Self::RandomHex { length } => ParamValue::Text(derive(seed, name, *length)),
            Self::RandomInt { min, max } => {
                let span = i128::from(*max) - i128::from(*min) + 1;
                let drawn = derive_u128(seed, name, INT_HEX_LEN) as i128;
                let value = i128::from(*min) + drawn % span;
                // min <= value <= max by construction, so this always fits.
                ParamValue::Int(i64::try_from(value).unwrap_or(*min))
            }
            Self::Choice { choices } => {
                let index = derive_u128(seed, name, CHOICE_HEX_LEN) % choices.len() as u128;
                ParamValue::Text(choices[index as usize].clone())
            }
        }
    }
}

/// Resolve every parameter of `lab` under `seed`, in declared order.
///
/// The result always carries `SEED -> seed`. Unnamed specs fall back to
/// `param_<index>`.
pub fn resolve(lab: &LabDefinition, seed: &str) -> LabResult<ResolvedParameters> {
    resolve_specs(&lab.parameters, seed)
}

pub fn resolve_specs(specs: &[ParameterSpec], seed: &str) -> LabResult<ResolvedParameters> {
    let mut values = ResolvedParameters::with_seed(seed);
    let mut seen = BTreeSet::new();
    for (index, spec) in specs.iter().enumerate() {
        let name = spec.resolved_name(index);
        if name == SEED_KEY {
            return Err(LabError::ReservedParameterName { name });
        }
        if !seen.insert(name.clone()) {
            return Err(LabError::DuplicateParameter { name });
        }
        let kind = ParamKind::parse(&name, spec)?;
        let value = kind.generate(seed, &name);
        debug!(parameter = %name, kind = %spec.kind, "parameter resolved");
        values.insert(name, value);
    }
    Ok(values)
}
