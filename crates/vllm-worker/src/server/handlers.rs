use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::server::{AppState, job_error_response, streaming};

/// Wire shape of a submitted job: the payload rides under `input`, matching
/// the serverless host's envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct JobEnvelope {
    pub input: serde_json::Value,
}

pub async fn run(State(app): State<AppState>, Json(envelope): Json<JobEnvelope>) -> Response {
    let run = match app.worker.handle(envelope.input).await {
        Ok(run) => run,
        Err(e) => return job_error_response(e),
    };

    if run.stream_requested {
        let keep_alive_ms = app.worker.config().sse_keep_alive_ms;
        return streaming::sse_job_stream(app.worker.clone(), run, keep_alive_ms).into_response();
    }

    let chunks = run.collect_all().await;
    Json(chunks).into_response()
}

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn concurrency(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "max_concurrency": app.worker.max_concurrency(),
    }))
}
