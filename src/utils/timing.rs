use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

use super::logging::TIMING_TARGET;

/// Tracks one request through decode, resolve, composite and encode.
#[derive(Debug)]
pub struct RequestTimer {
    adapter: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    stage_started: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl RequestTimer {
    pub fn start(adapter: &str) -> Self {
        let timer = RequestTimer {
            adapter: adapter.to_string(),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            stage_started: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        };
        info!(
            target: TIMING_TARGET,
            "event=request_received adapter={} received_at={}",
            timer.adapter,
            timer.started_at.to_rfc3339()
        );
        timer
    }

    /// Logs the time spent since the previous stage boundary.
    pub fn stage(&mut self, stage: &str) {
        let duration = self.stage_started.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=stage_completed adapter={} stage={} duration_s={:.3}",
            self.adapter,
            stage,
            duration
        );
        self.stage_started = Instant::now();
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed adapter={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.adapter,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
