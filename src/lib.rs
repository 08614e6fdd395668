use std::{sync::Arc, time::Duration};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod session;
pub mod weather_client;

use mcp::dispatcher::ToolDispatcher;
use session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub sse_keep_alive: Duration,
    pub weather_api_configured: bool,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatcher: Arc<ToolDispatcher>,
        sse_keep_alive: Duration,
        weather_api_configured: bool,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            sse_keep_alive,
            weather_api_configured,
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::handlers::health))
        .route(
            "/mcp",
            post(http::handlers::mcp_post)
                .get(http::handlers::mcp_get)
                .delete(http::handlers::mcp_delete),
        )
        .layer(CatchPanicLayer::custom(http::handlers::panic_response))
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
