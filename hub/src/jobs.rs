//! Registry of sweep jobs and the task that runs each one.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sweep_core::{
    AcceptanceCriteria, ApplyStatus, CancelToken, OptimizeError, ParameterSet, RunControl,
    RunGuard, SweepEvent, SweepReport,
};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::state::{AppState, PageOptimizer};
use crate::ws::topics::{TOPIC_JOBS, optimize_topic};

/// Unique job identifier.
pub type JobId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
    Cancelled,
}

/// Metadata for a running or completed sweep.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: String,
    pub finished_at: Option<String>,
    pub parameters: usize,
    pub candidates: usize,
    /// Candidates evaluated so far.
    pub trials: usize,
    pub best_net_profit: Option<f64>,
    pub found: Option<bool>,
    pub cancel_requested: bool,
    pub apply_result: Option<ApplyStatus>,
    pub error: Option<String>,
    #[serde(skip)]
    pub report: Option<SweepReport>,
    #[serde(skip)]
    seq: u64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum CancelRefused {
    Unknown,
    NotRunning,
}

/// Thread-safe job store.
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, JobInfo>>,
    cancels: Mutex<HashMap<JobId, CancelToken>>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        })
    }

    async fn register(&self, id: &str, parameters: &ParameterSet, cancel: CancelToken) {
        let info = JobInfo {
            id: id.to_string(),
            status: JobStatus::Running,
            created_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
            parameters: parameters.len(),
            candidates: parameters.total_candidates(),
            trials: 0,
            best_net_profit: None,
            found: None,
            cancel_requested: false,
            apply_result: None,
            error: None,
            report: None,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.jobs.lock().await.insert(id.to_string(), info);
        self.cancels.lock().await.insert(id.to_string(), cancel);
    }

    pub async fn get(&self, id: &str) -> Option<JobInfo> {
        self.jobs.lock().await.get(id).cloned()
    }

    /// All jobs, newest first.
    pub async fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().await;
        let mut all: Vec<JobInfo> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.seq.cmp(&a.seq));
        all
    }

    async fn update(&self, id: &str, f: impl FnOnce(&mut JobInfo)) {
        if let Some(job) = self.jobs.lock().await.get_mut(id) {
            f(job);
        }
    }

    /// Ask a running job to stop after its current candidate.
    pub async fn request_cancel(&self, id: &str) -> Result<(), CancelRefused> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(id).ok_or(CancelRefused::Unknown)?;
        if job.status != JobStatus::Running {
            return Err(CancelRefused::NotRunning);
        }
        if let Some(token) = self.cancels.lock().await.get(id) {
            token.cancel();
        }
        job.cancel_requested = true;
        Ok(())
    }

    async fn finish(
        &self,
        id: &str,
        outcome: Result<(SweepReport, Option<ApplyStatus>), OptimizeError>,
    ) -> Option<JobStatus> {
        self.cancels.lock().await.remove(id);
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(id)?;
        job.finished_at = Some(chrono::Utc::now().to_rfc3339());
        match outcome {
            Ok((report, apply)) => {
                job.status = if report.cancelled {
                    JobStatus::Cancelled
                } else {
                    JobStatus::Done
                };
                job.trials = report.trials.len();
                job.found = Some(report.is_found());
                job.best_net_profit = report.best().and_then(|b| b.snapshot.net_profit);
                job.apply_result = apply;
                job.report = Some(report);
            }
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
            }
        }
        Some(job.status)
    }
}

/// What to sweep, already validated.
pub struct OptimizeJob {
    pub parameters: ParameterSet,
    pub criteria: AcceptanceCriteria,
    pub apply_best: bool,
}

/// Register a job and run it in the background under `guard`.
///
/// The guard is released before the job is marked finished, so a client
/// that sees a terminal status can start the next run immediately.
pub async fn spawn_optimize(
    state: &Arc<AppState>,
    guard: RunGuard,
    optimizer: PageOptimizer,
    job: OptimizeJob,
) -> JobId {
    let job_id = uuid::Uuid::new_v4().to_string();
    let cancel = CancelToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let control = RunControl::new()
        .with_cancel(cancel.clone())
        .with_progress(tx);

    state.jobs.register(&job_id, &job.parameters, cancel).await;
    state.broadcast.publish_json(
        TOPIC_JOBS,
        &json!({"type": "job_started", "job_id": job_id}),
    );

    let forwarder = tokio::spawn(forward_events(Arc::clone(state), job_id.clone(), rx));

    let st = Arc::clone(state);
    let jid = job_id.clone();
    tokio::spawn(async move {
        let outcome = if job.apply_best {
            optimizer
                .optimize_and_apply_held(&guard, &job.parameters, &job.criteria, &control)
                .await
                .map(|(report, status)| (report, Some(status)))
        } else {
            optimizer
                .optimize_held(&guard, &job.parameters, &job.criteria, &control)
                .await
                .map(|report| (report, None))
        };
        drop(guard);
        // Closes the progress channel so the forwarder drains and exits.
        drop(control);
        let _ = forwarder.await;

        if let Err(e) = &outcome {
            warn!(job_id = %jid, error = %e, "optimize job failed");
        }
        let status = st.jobs.finish(&jid, outcome).await;
        info!(job_id = %jid, ?status, "optimize job finished");

        let done = json!({"type": "job_done", "job_id": jid, "status": status});
        let topic = optimize_topic(&jid);
        st.broadcast.publish_json(&topic, &done);
        st.broadcast.publish_json(TOPIC_JOBS, &done);
        st.broadcast.close_topic(&topic);
    });

    job_id
}

/// Mirror progress into the job record and out to WebSocket subscribers.
async fn forward_events(
    state: Arc<AppState>,
    job_id: JobId,
    mut rx: mpsc::UnboundedReceiver<SweepEvent>,
) {
    let topic = optimize_topic(&job_id);
    while let Some(event) = rx.recv().await {
        match &event {
            SweepEvent::CandidateEvaluated { .. } => {
                state.jobs.update(&job_id, |j| j.trials += 1).await;
            }
            SweepEvent::NewBest { best } => {
                let profit = best.snapshot.net_profit;
                state
                    .jobs
                    .update(&job_id, |j| j.best_net_profit = profit)
                    .await;
            }
            _ => {}
        }
        state.broadcast.publish_json(&topic, &tag_event(&job_id, &event));
    }
}

fn tag_event(job_id: &str, event: &SweepEvent) -> Value {
    let mut value = serde_json::to_value(event).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.insert("job_id".into(), Value::String(job_id.to_string()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::{Parameter, SweepOutcome};

    fn params() -> ParameterSet {
        ParameterSet::new().with(Parameter::new("length", 1.0, 3.0, 1.0))
    }

    fn report(cancelled: bool) -> SweepReport {
        SweepReport {
            outcome: SweepOutcome::NotFound,
            trials: Vec::new(),
            cancelled,
        }
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = JobStore::new();
        store.register("a", &params(), CancelToken::new()).await;
        store.register("b", &params(), CancelToken::new()).await;
        store.register("c", &params(), CancelToken::new()).await;
        let ids: Vec<String> = store.list().await.into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(store.get("a").await.unwrap().candidates, 3);
    }

    #[tokio::test]
    async fn cancel_trips_token_only_while_running() {
        let store = JobStore::new();
        let token = CancelToken::new();
        store.register("job", &params(), token.clone()).await;

        assert_eq!(store.request_cancel("nope").await, Err(CancelRefused::Unknown));
        store.request_cancel("job").await.unwrap();
        assert!(token.is_cancelled());
        assert!(store.get("job").await.unwrap().cancel_requested);

        store.finish("job", Ok((report(true), None))).await;
        assert_eq!(store.get("job").await.unwrap().status, JobStatus::Cancelled);
        assert_eq!(
            store.request_cancel("job").await,
            Err(CancelRefused::NotRunning)
        );
    }

    #[tokio::test]
    async fn finish_records_failure() {
        let store = JobStore::new();
        store.register("job", &params(), CancelToken::new()).await;
        let status = store.finish("job", Err(OptimizeError::RunInProgress)).await;
        assert_eq!(status, Some(JobStatus::Failed));
        let job = store.get("job").await.unwrap();
        assert!(job.error.unwrap().contains("already driving"));
        assert!(job.report.is_none());
    }

    #[test]
    fn events_are_tagged_with_job() {
        let v = tag_event(
            "j1",
            &SweepEvent::RunFinished {
                found: false,
                cancelled: false,
                trials: 4,
            },
        );
        assert_eq!(v["type"], "run_finished");
        assert_eq!(v["job_id"], "j1");
        assert_eq!(v["trials"], 4);
    }
}
