use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use sweep_core::{AcceptanceCriteria, ApplyStatus, BestSelection, ParameterSet, SweepReport};

use crate::error::HubError;
use crate::jobs::{self, CancelRefused, JobId, JobInfo, JobStatus, OptimizeJob};
use crate::state::AppState;

/// Body for POST /api/optimize.
#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub parameters: ParameterSet,
    #[serde(default)]
    pub criteria: AcceptanceCriteria,
    /// Replay the winner once the sweep completes (default true).
    #[serde(default = "default_apply_best")]
    pub apply_best: bool,
    /// Overrides the hub's settle delay for this run.
    pub settle_ms: Option<u64>,
    pub selection: Option<BestSelection>,
}

fn default_apply_best() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct JobResults {
    job_id: JobId,
    status: JobStatus,
    #[serde(flatten)]
    report: SweepReport,
    apply_result: Option<ApplyStatus>,
}

/// Build optimize sub-router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/optimize", post(start_optimize))
        .route("/api/optimize/jobs", get(list_jobs))
        .route("/api/optimize/{id}/status", get(job_status))
        .route("/api/optimize/{id}/results", get(job_results))
        .route("/api/optimize/{id}", delete(cancel_job))
}

/// POST /api/optimize: validate, claim the page and start a sweep.
async fn start_optimize(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OptimizeRequest>,
) -> Result<Json<Value>, HubError> {
    let settings = state.config.sweep_settings(body.settle_ms, body.selection);
    let optimizer = state.optimizer(settings);
    optimizer.validate(&body.parameters, &body.criteria)?;
    let guard = optimizer.begin()?;

    let job = OptimizeJob {
        parameters: body.parameters,
        criteria: body.criteria,
        apply_best: body.apply_best,
    };
    let job_id = jobs::spawn_optimize(&state, guard, optimizer, job).await;
    tracing::info!(job_id = %job_id, "optimize job started");

    Ok(Json(json!({
        "job_id": job_id,
        "status": JobStatus::Running,
    })))
}

/// GET /api/optimize/jobs: list all jobs, newest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobInfo>> {
    Json(state.jobs.list().await)
}

/// GET /api/optimize/{id}/status: progress counters and status.
async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobInfo>, HubError> {
    state
        .jobs
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| HubError::NotFound(format!("job {id} not found")))
}

/// GET /api/optimize/{id}/results: full sweep report.
async fn job_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResults>, HubError> {
    let job = state
        .jobs
        .get(&id)
        .await
        .ok_or_else(|| HubError::NotFound(format!("job {id} not found")))?;
    if job.status == JobStatus::Running {
        return Err(HubError::BadRequest("job still running".into()));
    }
    let Some(report) = job.report else {
        let reason = job.error.unwrap_or_else(|| "no result available".into());
        return Err(HubError::NotFound(reason));
    };
    Ok(Json(JobResults {
        job_id: job.id,
        status: job.status,
        report,
        apply_result: job.apply_result,
    }))
}

/// DELETE /api/optimize/{id}: stop after the current candidate.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, HubError> {
    match state.jobs.request_cancel(&id).await {
        Ok(()) => {
            tracing::info!(job_id = %id, "cancel requested");
            Ok(Json(json!({ "ok": true, "cancel_requested": id })))
        }
        Err(CancelRefused::Unknown) => Err(HubError::NotFound(format!("job {id} not found"))),
        Err(CancelRefused::NotRunning) => Err(HubError::BadRequest("job is not running".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use std::time::Duration;
    use sweep_core::{Parameter, TrialStatus};

    fn request(params: ParameterSet) -> OptimizeRequest {
        OptimizeRequest {
            parameters: params,
            criteria: AcceptanceCriteria::default(),
            apply_best: true,
            settle_ms: None,
            selection: None,
        }
    }

    fn length_sweep() -> ParameterSet {
        ParameterSet::new().with(Parameter::new("length", 1.0, 3.0, 1.0))
    }

    async fn wait_finished(state: &Arc<AppState>, id: &str) -> JobInfo {
        for _ in 0..500 {
            let job = state.jobs.get(id).await.unwrap();
            if job.status != JobStatus::Running {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[test]
    fn request_defaults() {
        let body: OptimizeRequest = serde_json::from_value(json!({
            "parameters": [{"name": "length", "min": 5, "max": 20, "step": 5}]
        }))
        .unwrap();
        assert!(body.apply_best);
        assert_eq!(body.criteria, AcceptanceCriteria::default());
        assert!(body.settle_ms.is_none());
        assert_eq!(body.parameters.total_candidates(), 4);
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_any_job() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let bad = ParameterSet::new().with(Parameter::new("length", 5.0, 1.0, 1.0));

        let err = start_optimize(State(Arc::clone(&state)), Json(request(bad)))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::BadRequest(_)));
        assert!(state.jobs.list().await.is_empty());
        assert!(!state.page_lock.is_held());
    }

    #[tokio::test]
    async fn busy_page_is_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let _held = state.page_lock.try_acquire().unwrap();

        let err = start_optimize(State(Arc::clone(&state)), Json(request(length_sweep())))
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Busy));
        assert!(state.jobs.list().await.is_empty());
    }

    #[tokio::test]
    async fn job_runs_to_completion_and_releases_page() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(started) = start_optimize(State(Arc::clone(&state)), Json(request(length_sweep())))
            .await
            .unwrap();
        let id = started["job_id"].as_str().unwrap().to_string();
        assert_eq!(started["status"], "running");

        let job = wait_finished(&state, &id).await;
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.trials, 3);
        assert_eq!(job.found, Some(false));
        assert!(!state.page_lock.is_held());

        let Json(results) = job_results(State(Arc::clone(&state)), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(results.report.trials.len(), 3);
        assert!(results
            .report
            .trials
            .iter()
            .all(|t| matches!(t.status, TrialStatus::ApplyFailed { .. })));
        assert_eq!(results.apply_result, Some(ApplyStatus::Skipped));

        let Json(listed) = list_jobs(State(Arc::clone(&state))).await;
        assert_eq!(listed.len(), 1);

        let err = cancel_job(State(state), Path(id)).await.unwrap_err();
        assert!(matches!(err, HubError::BadRequest(_)));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        assert!(matches!(
            job_status(State(Arc::clone(&state)), Path("nope".into())).await,
            Err(HubError::NotFound(_))
        ));
        assert!(matches!(
            job_results(State(Arc::clone(&state)), Path("nope".into())).await,
            Err(HubError::NotFound(_))
        ));
        assert!(matches!(
            cancel_job(State(state), Path("nope".into())).await,
            Err(HubError::NotFound(_))
        ));
    }
}
