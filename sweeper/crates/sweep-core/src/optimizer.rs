//! Greedy per-parameter sweep over the page's strategy tester.
//!
//! Parameters are swept one at a time in set order. While one parameter is
//! stepped through its candidates, every other input stays wherever it was
//! last applied, so the result depends on parameter order and is a local
//! optimum rather than a true grid optimum. A full cartesian product is not
//! affordable when every recompute takes seconds.
//!
//! Per candidate: apply through the [`InputDriver`], wait the settle delay,
//! read through the [`ResultReader`], gate on [`AcceptanceCriteria`], and
//! keep the candidate if it strictly beats the current best on net profit.
//! Collaborator failures skip the candidate; only configuration errors and
//! lock contention fail the call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::collab::{InputDriver, ResultReader};
use crate::control::{RunControl, RunGuard, RunLock, SweepEvent};
use crate::criteria::AcceptanceCriteria;
use crate::error::{ApplyBestError, OptimizeError};
use crate::metrics::MetricsSnapshot;
use crate::params::{Parameter, ParameterSet};

pub const DEFAULT_SETTLE_MS: u64 = 1_000;
pub const DEFAULT_MAX_CANDIDATES: usize = 10_000;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// How the first retained candidate is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestSelection {
    /// Only candidates that clear the criteria are ever retained.
    #[default]
    ValidOnly,
    /// The first snapshot is retained even when it fails the criteria; later
    /// candidates replace it only when valid and strictly more profitable.
    SeedWithFirstSnapshot,
}

impl BestSelection {
    fn accepts(self, incumbent: Option<&BestResult>, snap: &MetricsSnapshot, valid: bool) -> bool {
        match incumbent {
            None => match self {
                BestSelection::ValidOnly => valid,
                BestSelection::SeedWithFirstSnapshot => true,
            },
            Some(best) => valid && beats(snap.net_profit, best.snapshot.net_profit),
        }
    }
}

/// Strict `>` so ties keep the earlier candidate.
fn beats(candidate: Option<f64>, incumbent: Option<f64>) -> bool {
    match (candidate, incumbent) {
        (Some(c), Some(i)) => c > i,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Wait between applying a value and reading results.
    pub settle_ms: u64,
    pub max_candidates_per_parameter: usize,
    pub selection: BestSelection,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE_MS,
            max_candidates_per_parameter: DEFAULT_MAX_CANDIDATES,
            selection: BestSelection::default(),
        }
    }
}

impl SweepSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    pub name: String,
    pub value: f64,
}

/// Winning value per parameter name, in the order parameters were swept.
///
/// Serialized as a list of `{name, value}`. A list naming a parameter twice
/// is rejected when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParamValue>", into = "Vec<ParamValue>")]
pub struct BestInputs {
    values: Vec<ParamValue>,
}

impl BestInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite in place, or append when the name is new.
    pub fn set(&mut self, name: &str, value: f64) {
        match self.values.iter_mut().find(|pv| pv.name == name) {
            Some(pv) => pv.value = value,
            None => self.values.push(ParamValue {
                name: name.to_string(),
                value,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|pv| pv.name == name).map(|pv| pv.value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParamValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for BestInputs {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut inputs = BestInputs::new();
        for (name, value) in iter {
            inputs.set(&name.into(), value);
        }
        inputs
    }
}

impl TryFrom<Vec<ParamValue>> for BestInputs {
    type Error = String;

    fn try_from(values: Vec<ParamValue>) -> Result<Self, Self::Error> {
        let mut inputs = BestInputs::new();
        for pv in values {
            if inputs.get(&pv.name).is_some() {
                return Err(format!("duplicate value for parameter {}", pv.name));
            }
            inputs.values.push(pv);
        }
        Ok(inputs)
    }
}

impl From<BestInputs> for Vec<ParamValue> {
    fn from(inputs: BestInputs) -> Self {
        inputs.values
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub inputs: BestInputs,
    pub snapshot: MetricsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    Found(BestResult),
    /// No candidate was retained. A defined result, not a failure.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialStatus {
    Evaluated {
        snapshot: MetricsSnapshot,
        valid: bool,
        improved: bool,
    },
    ApplyFailed {
        error: String,
    },
    Unavailable,
}

/// One candidate and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub parameter: String,
    pub value: f64,
    #[serde(flatten)]
    pub status: TrialStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    #[serde(flatten)]
    pub outcome: SweepOutcome,
    pub trials: Vec<Trial>,
    /// Stopped early on request; `outcome` holds the best found until then.
    pub cancelled: bool,
}

impl SweepReport {
    pub fn best(&self) -> Option<&BestResult> {
        match &self.outcome {
            SweepOutcome::Found(best) => Some(best),
            SweepOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.best().is_some()
    }

    /// Trials whose candidate had to be skipped.
    pub fn skipped(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| !matches!(t.status, TrialStatus::Evaluated { .. }))
            .count()
    }
}

/// What happened to the winning inputs after a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "apply", rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    /// Nothing found, or the run was cancelled.
    Skipped,
    Failed {
        parameter: Option<String>,
        error: String,
    },
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Owns the collaborators for one page plus that page's run lock.
pub struct Optimizer<D, R> {
    driver: D,
    reader: R,
    settings: SweepSettings,
    lock: RunLock,
}

impl<D: InputDriver, R: ResultReader> Optimizer<D, R> {
    pub fn new(driver: D, reader: R) -> Self {
        Self {
            driver,
            reader,
            settings: SweepSettings::default(),
            lock: RunLock::new(),
        }
    }

    pub fn with_settings(mut self, settings: SweepSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a lock with other optimizers that drive the same page.
    pub fn with_lock(mut self, lock: RunLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Claim the page for a sequence of `*_held` calls.
    pub fn begin(&self) -> Result<RunGuard, OptimizeError> {
        self.lock.try_acquire().ok_or(OptimizeError::RunInProgress)
    }

    pub fn validate(
        &self,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
    ) -> Result<(), OptimizeError> {
        parameters.validate(self.settings.max_candidates_per_parameter)?;
        criteria.validate()?;
        Ok(())
    }

    /// Sweep `parameters` and return the best candidate found.
    ///
    /// Fails before touching the page on invalid configuration or when
    /// another run holds the lock.
    pub async fn optimize(
        &self,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
        control: &RunControl,
    ) -> Result<SweepReport, OptimizeError> {
        self.validate(parameters, criteria)?;
        let guard = self.begin()?;
        self.optimize_held(&guard, parameters, criteria, control).await
    }

    pub async fn optimize_held(
        &self,
        guard: &RunGuard,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
        control: &RunControl,
    ) -> Result<SweepReport, OptimizeError> {
        self.validate(parameters, criteria)?;
        if !self.lock.issued(guard) {
            return Err(OptimizeError::RunInProgress);
        }
        Ok(self.sweep(parameters, criteria, control).await)
    }

    /// Replay `values` through the driver in order, stopping at the first
    /// failure. Already-applied values are not rolled back.
    pub async fn apply_best(&self, values: &BestInputs) -> Result<(), ApplyBestError> {
        check_values(values)?;
        let guard = self
            .lock
            .try_acquire()
            .ok_or(ApplyBestError::RunInProgress)?;
        self.apply_best_held(&guard, values).await
    }

    pub async fn apply_best_held(
        &self,
        guard: &RunGuard,
        values: &BestInputs,
    ) -> Result<(), ApplyBestError> {
        if !self.lock.issued(guard) {
            return Err(ApplyBestError::RunInProgress);
        }
        check_values(values)?;
        for pv in values.iter() {
            info!(param = %pv.name, value = pv.value, "applying best value");
            if let Err(source) = self.driver.set_value(&pv.name, pv.value).await {
                warn!(param = %pv.name, value = pv.value, error = %source, "apply best failed, page left partially updated");
                return Err(ApplyBestError::Step {
                    parameter: pv.name.clone(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// Sweep, then replay the winner under the same claim on the page.
    pub async fn optimize_and_apply(
        &self,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
        control: &RunControl,
    ) -> Result<(SweepReport, ApplyStatus), OptimizeError> {
        self.validate(parameters, criteria)?;
        let guard = self.begin()?;
        self.optimize_and_apply_held(&guard, parameters, criteria, control)
            .await
    }

    pub async fn optimize_and_apply_held(
        &self,
        guard: &RunGuard,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
        control: &RunControl,
    ) -> Result<(SweepReport, ApplyStatus), OptimizeError> {
        let report = self
            .optimize_held(guard, parameters, criteria, control)
            .await?;
        let status = match report.best() {
            Some(best) if !report.cancelled => {
                match self.apply_best_held(guard, &best.inputs).await {
                    Ok(()) => ApplyStatus::Applied,
                    Err(e) => ApplyStatus::Failed {
                        parameter: e.parameter().map(str::to_string),
                        error: e.to_string(),
                    },
                }
            }
            _ => ApplyStatus::Skipped,
        };
        Ok((report, status))
    }

    async fn sweep(
        &self,
        parameters: &ParameterSet,
        criteria: &AcceptanceCriteria,
        control: &RunControl,
    ) -> SweepReport {
        let total = parameters.total_candidates();
        info!(
            parameters = parameters.len(),
            candidates = total,
            settle_ms = self.settings.settle_ms,
            "starting parameter sweep"
        );
        control.emit(SweepEvent::RunStarted {
            parameters: parameters.len(),
            candidates: total,
        });

        let mut best: Option<BestResult> = None;
        let mut trials = Vec::with_capacity(total);
        let mut cancelled = false;

        'params: for param in parameters {
            let values = param.candidate_values();
            debug!(param = %param.name, candidates = values.len(), "sweeping parameter");
            control.emit(SweepEvent::ParameterStarted {
                name: param.name.clone(),
                candidates: values.len(),
            });

            for value in values {
                if control.is_cancelled() {
                    info!(param = %param.name, value, "sweep cancelled");
                    cancelled = true;
                    break 'params;
                }
                let status = self.evaluate(param, value, criteria, &mut best, control).await;
                let trial = Trial {
                    parameter: param.name.clone(),
                    value,
                    status,
                };
                control.emit(SweepEvent::CandidateEvaluated {
                    trial: trial.clone(),
                });
                trials.push(trial);
            }
        }

        let found = best.is_some();
        match &best {
            Some(b) => info!(
                net_profit = ?b.snapshot.net_profit,
                inputs = b.inputs.len(),
                trials = trials.len(),
                cancelled,
                "sweep finished"
            ),
            None => info!(trials = trials.len(), cancelled, "sweep finished without a valid candidate"),
        }
        control.emit(SweepEvent::RunFinished {
            found,
            cancelled,
            trials: trials.len(),
        });

        SweepReport {
            outcome: best.map_or(SweepOutcome::NotFound, SweepOutcome::Found),
            trials,
            cancelled,
        }
    }

    /// Apply, settle, read, score. Never fails the run.
    async fn evaluate(
        &self,
        param: &Parameter,
        value: f64,
        criteria: &AcceptanceCriteria,
        best: &mut Option<BestResult>,
        control: &RunControl,
    ) -> TrialStatus {
        if let Err(e) = self.driver.set_value(&param.name, value).await {
            warn!(param = %param.name, value, error = %e, "apply failed, skipping candidate");
            return TrialStatus::ApplyFailed {
                error: e.to_string(),
            };
        }

        sleep(self.settings.settle_delay()).await;

        let Some(snapshot) = self.reader.read().await else {
            warn!(param = %param.name, value, "results unavailable, skipping candidate");
            return TrialStatus::Unavailable;
        };

        let valid = criteria.is_satisfied_by(&snapshot);
        if !valid {
            debug!(param = %param.name, value, unmet = ?criteria.unmet(&snapshot), "candidate rejected");
        }

        let improved = self
            .settings
            .selection
            .accepts(best.as_ref(), &snapshot, valid);
        if improved {
            let mut inputs = best.take().map(|b| b.inputs).unwrap_or_default();
            inputs.set(&param.name, value);
            let updated = BestResult { inputs, snapshot };
            info!(
                param = %param.name,
                value,
                net_profit = ?snapshot.net_profit,
                valid,
                "new best candidate"
            );
            control.emit(SweepEvent::NewBest {
                best: updated.clone(),
            });
            *best = Some(updated);
        }

        TrialStatus::Evaluated {
            snapshot,
            valid,
            improved,
        }
    }
}

fn check_values(values: &BestInputs) -> Result<(), ApplyBestError> {
    match values.iter().find(|pv| !pv.value.is_finite()) {
        Some(pv) => Err(ApplyBestError::InvalidValue {
            parameter: pv.name.clone(),
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
