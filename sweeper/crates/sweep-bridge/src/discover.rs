//! Tunable inputs found in the strategy's settings dialog, and the starter
//! sweep ranges derived from them.

use serde::{Deserialize, Serialize};
use sweep_core::{Parameter, ParameterSet};
use tracing::debug;

/// Step used when a numeric control declares none.
pub const DEFAULT_STEP: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Number,
    Boolean,
    Select,
    #[serde(rename = "string", other)]
    Text,
}

/// One control as reported by the agent. Numeric attributes arrive as the
/// raw attribute text and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: InputKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    /// Option values of a select.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

fn number(text: Option<&str>) -> Option<f64> {
    text.map(str::trim)
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Starter range for a numeric control.
///
/// Declared `min`/`max`/`step` win. A missing bound falls back to half or
/// double the current value, a missing or non-positive step to
/// [`DEFAULT_STEP`]. Non-numeric controls and numeric ones with neither a
/// bound nor a readable value yield `None`.
pub fn suggest_parameter(info: &InputInfo) -> Option<Parameter> {
    if info.kind != InputKind::Number || info.name.trim().is_empty() {
        return None;
    }
    let value = number(info.value.as_deref());
    let min = number(info.min.as_deref()).or(value.map(|v| v / 2.0))?;
    let max = number(info.max.as_deref()).or(value.map(|v| v * 2.0))?;
    let step = number(info.step.as_deref())
        .filter(|s| *s > 0.0)
        .unwrap_or(DEFAULT_STEP);
    // Halving and doubling a negative value swaps the bounds.
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    Some(Parameter::new(info.name.trim(), min, max, step))
}

/// Starter parameter set: one parameter per numeric control, in page order.
/// Later controls repeating an earlier name are skipped.
pub fn starter_parameters(inputs: &[InputInfo]) -> ParameterSet {
    let mut params = ParameterSet::new();
    for info in inputs {
        let Some(param) = suggest_parameter(info) else {
            debug!(input = %info.name, kind = ?info.kind, "input not sweepable");
            continue;
        };
        if params.get(&param.name).is_some() {
            debug!(input = %param.name, "duplicate input skipped");
            continue;
        }
        params.push(param);
    }
    params
}
