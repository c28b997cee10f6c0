use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handler::Worker;
use crate::server::handlers;

#[derive(Clone)]
pub struct AppState {
    pub worker: Worker,
}

/// Assembles the worker's HTTP surface: the serverless-host stand-in used
/// for local runs and tests.
pub struct RouterBuilder {
    state: Option<AppState>,
    allowed_origins: Option<Vec<String>>,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            state: None,
            allowed_origins: None,
        }
    }

    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.state = Some(AppState { worker });
        self
    }

    pub fn with_allowed_origins(mut self, allowed_origins: Vec<String>) -> Self {
        self.allowed_origins = Some(allowed_origins);
        self
    }

    pub fn build(self) -> crate::Result<Router> {
        let state = self
            .state
            .ok_or_else(|| crate::Error::internal("worker must be set"))?;

        let allow_origin = if let Some(origins) = self.allowed_origins {
            let parsed: Result<Vec<_>, _> = origins.into_iter().map(|o| o.parse()).collect();
            match parsed {
                Ok(origins) => AllowOrigin::list(origins),
                Err(_) => {
                    return Err(crate::Error::bad_request("invalid allowed origin format"));
                }
            }
        } else {
            AllowOrigin::any()
        };

        let cors_layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
            .allow_origin(allow_origin);

        let body_limit = state.worker.config().request_body_limit_bytes;
        let router = Router::new()
            .route("/run", post(handlers::run))
            .route("/health", get(handlers::health))
            .route("/concurrency", get(handlers::concurrency))
            .layer(cors_layer)
            .layer(DefaultBodyLimit::max(body_limit))
            .with_state(state);

        Ok(router)
    }
}
