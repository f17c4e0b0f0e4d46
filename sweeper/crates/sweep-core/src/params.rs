//! Tunable strategy inputs and the candidate values swept for each.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Candidates finer than this many decimal places are left unrounded.
const MAX_DECIMALS: usize = 10;

// ---------------------------------------------------------------------------
// Parameter
// ---------------------------------------------------------------------------

/// One tunable input of the strategy, swept over `min..=max` in `step` increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the input control on the page.
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step,
        }
    }

    /// Check the range in isolation. `limit` caps the number of candidates.
    pub fn validate(&self, limit: usize) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err(ConfigError::NonFinite {
                name: self.name.clone(),
            });
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedRange {
                name: self.name.clone(),
                min: self.min,
                max: self.max,
            });
        }
        if self.step <= 0.0 {
            return Err(ConfigError::NonPositiveStep {
                name: self.name.clone(),
                step: self.step,
            });
        }
        // Compare in f64 before converting so a microscopic step cannot overflow.
        if self.span_steps() + 1.0 > limit as f64 {
            return Err(ConfigError::TooManyCandidates {
                name: self.name.clone(),
                limit,
            });
        }
        Ok(())
    }

    /// Whole steps that fit between min and max, tolerant of float noise.
    fn span_steps(&self) -> f64 {
        ((self.max - self.min) / self.step + 1e-9).floor()
    }

    /// Number of values [`candidate_values`](Self::candidate_values) yields.
    /// Only meaningful for a validated parameter.
    pub fn candidate_count(&self) -> usize {
        self.span_steps() as usize + 1
    }

    /// The ascending arithmetic sequence `min, min+step, ... <= max`.
    ///
    /// Values are computed from the index rather than accumulated, rounded to
    /// the decimal precision of `min`/`step`, and never exceed `max`.
    pub fn candidate_values(&self) -> Vec<f64> {
        let decimals = decimals_of(self.min).max(decimals_of(self.step));
        (0..self.candidate_count())
            .map(|i| {
                let raw = self.min + i as f64 * self.step;
                let value = if decimals <= MAX_DECIMALS {
                    round_to(raw, decimals)
                } else {
                    raw
                };
                value.min(self.max)
            })
            .collect()
    }
}

/// Decimal places in the shortest round-trip rendering of `x`.
fn decimals_of(x: f64) -> usize {
    let text = format!("{x}");
    match text.split_once('.') {
        Some((_, frac)) => frac.len(),
        None => 0,
    }
}

fn round_to(x: f64, decimals: usize) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    let rounded = (x * scale).round() / scale;
    if rounded.is_finite() { rounded } else { x }
}

// ---------------------------------------------------------------------------
// ParameterSet
// ---------------------------------------------------------------------------

/// Ordered collection of parameters with unique names.
///
/// Order is significant: parameters are swept one after another and each
/// later sweep runs with earlier inputs left at their last applied value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn push(&mut self, param: Parameter) {
        self.params.push(param);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validate every parameter plus name uniqueness.
    pub fn validate(&self, limit: usize) -> Result<(), ConfigError> {
        if self.params.is_empty() {
            return Err(ConfigError::EmptyParameterSet);
        }
        let mut seen = HashSet::with_capacity(self.params.len());
        for param in &self.params {
            param.validate(limit)?;
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigError::DuplicateName(param.name.clone()));
            }
        }
        Ok(())
    }

    /// Total candidates across all parameters.
    pub fn total_candidates(&self) -> usize {
        self.params.iter().map(Parameter::candidate_count).sum()
    }
}

impl From<Vec<Parameter>> for ParameterSet {
    fn from(params: Vec<Parameter>) -> Self {
        Self { params }
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
