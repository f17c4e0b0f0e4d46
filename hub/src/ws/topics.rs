/// Dynamic topic for sweep progress: `optimize:{job_id}`.
pub fn optimize_topic(job_id: &str) -> String {
    format!("optimize:{job_id}")
}

/// Every job's lifecycle changes (started, finished).
pub const TOPIC_JOBS: &str = "jobs";
