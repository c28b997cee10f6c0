mod handlers;
mod router_builder;
mod streaming;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub use router_builder::{AppState, RouterBuilder};

pub(crate) fn job_error_response(err: crate::Error) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let chain = err.format_chain();
    if err.is_client_error() {
        tracing::warn!(error = %chain, "job rejected");
    } else {
        tracing::error!(error = %chain, "job failed");
    }
    (status, Json(crate::openai::ErrorResponse::from_error(&err))).into_response()
}
