//! Axum HTTP handlers for the web server
//!
//! Routes `/mcp` traffic to session transports: `POST` carries JSON-RPC calls,
//! `GET` opens the server-sent event stream and `DELETE` terminates the session.

use std::{any::Any, convert::Infallible, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use axum_extra::{headers::HeaderMapExt, TypedHeader};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::errors::SessionError;
use crate::http::headers::{
    requested_session, LastEventId, McpSessionIdHeader, SessionIdHeader,
};
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_error_with_data, session_error_to_json_rpc,
    INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR,
};
use crate::mcp::server::is_initialize_request;
use crate::session::{events::StoredEvent, SessionHandle, SessionId};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub weather_api_configured: bool,
    pub active_sessions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        weather_api_configured: state.weather_api_configured,
        active_sessions: state.registry.len().await,
    })
}

pub async fn mcp_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let session = match requested_session(&headers) {
        Ok(Some(session_id)) => match state.registry.get(&session_id).await {
            Ok(session) => Some(session),
            Err(err) => return session_error_response(None, &err),
        },
        Ok(None) => None,
        Err(err) => return session_error_response(None, &err),
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return rpc_response(
                StatusCode::BAD_REQUEST,
                json_rpc_error(None, PARSE_ERROR, "Parse error"),
            )
        }
    };

    match session {
        Some(session) => {
            let id = request_id(&payload);
            match session.transport().handle_call(payload).await {
                Ok(Some(response)) => (
                    StatusCode::OK,
                    session_headers(session.id()),
                    Json(response),
                )
                    .into_response(),
                Ok(None) => (StatusCode::ACCEPTED, session_headers(session.id())).into_response(),
                Err(err) => session_error_response(id, &err),
            }
        }
        None if is_initialize_request(&payload) => initialize_session(&state, payload).await,
        None => missing_session_response(request_id(&payload)),
    }
}

async fn initialize_session(state: &AppState, payload: Value) -> Response {
    let id = request_id(&payload);
    let session = match state.registry.create_session().await {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "failed to allocate session");
            return session_error_response(id, &err);
        }
    };

    if let Err(err) = session.transport().attach(Arc::clone(&state.dispatcher)) {
        discard_session(state, &session).await;
        return session_error_response(id, &err);
    }

    match session.transport().handle_call(payload).await {
        Ok(Some(response)) if !is_json_rpc_error(&response) => {
            info!(session_id = %session.id(), "session initialized");
            (StatusCode::OK, session_headers(session.id()), Json(response)).into_response()
        }
        Ok(Some(response)) => {
            discard_session(state, &session).await;
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => {
            discard_session(state, &session).await;
            rpc_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json_rpc_error(id, INTERNAL_ERROR, "Internal error"),
            )
        }
        Err(err) => {
            discard_session(state, &session).await;
            session_error_response(id, &err)
        }
    }
}

async fn discard_session(state: &AppState, session: &SessionHandle) {
    warn!(session_id = %session.id(), "initialize failed, discarding session");
    let _ = state.registry.terminate(session.id()).await;
}

pub async fn mcp_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session_id = match requested_session(&headers) {
        Ok(Some(session_id)) => session_id,
        Ok(None) => return missing_session_response(None),
        Err(err) => return session_error_response(None, &err),
    };

    let session = match state.registry.get(&session_id).await {
        Ok(session) => session,
        Err(err) => return session_error_response(None, &err),
    };

    let resume_after = match headers.typed_try_get::<LastEventId>() {
        Ok(marker) => marker.map(|LastEventId(event_id)| event_id),
        Err(_) => {
            return rpc_response(
                StatusCode::BAD_REQUEST,
                json_rpc_error_with_data(
                    None,
                    INVALID_REQUEST,
                    "Bad Request: invalid Last-Event-ID header",
                    Some(json!({
                        "code": "invalid_request",
                        "message": "Last-Event-ID must be a non-negative integer",
                        "details": {},
                    })),
                ),
            )
        }
    };

    match session.transport().open_stream(resume_after) {
        Ok(stream) => {
            let events = stream.map(|event| Ok::<_, Infallible>(to_sse_event(event)));
            let keep_alive = KeepAlive::new().interval(state.sse_keep_alive);
            (
                session_headers(session.id()),
                Sse::new(events).keep_alive(keep_alive),
            )
                .into_response()
        }
        Err(err) => session_error_response(None, &err),
    }
}

fn to_sse_event(event: StoredEvent) -> Event {
    Event::default()
        .id(event.id.to_string())
        .event("message")
        .data(event.data)
}

pub async fn mcp_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session_id = match requested_session(&headers) {
        Ok(Some(session_id)) => session_id,
        Ok(None) => return missing_session_response(None),
        Err(err) => return session_error_response(None, &err),
    };

    match state.registry.terminate(&session_id).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => session_error_response(None, &err),
    }
}

/// Handler for `CatchPanicLayer`; the panic payload never reaches the client.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "request handler panicked");

    rpc_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json_rpc_error(None, INTERNAL_ERROR, "Internal error"),
    )
}

fn session_headers(
    session_id: &SessionId,
) -> (TypedHeader<SessionIdHeader>, TypedHeader<McpSessionIdHeader>) {
    (
        TypedHeader(SessionIdHeader(session_id.clone())),
        TypedHeader(McpSessionIdHeader(session_id.clone())),
    )
}

fn request_id(payload: &Value) -> Option<Value> {
    payload.get("id").filter(|id| !id.is_null()).cloned()
}

fn session_error_status(err: &SessionError) -> StatusCode {
    match err {
        SessionError::UnknownSession => StatusCode::BAD_REQUEST,
        SessionError::SessionClosed => StatusCode::NOT_FOUND,
        SessionError::StreamAlreadyOpen => StatusCode::CONFLICT,
        SessionError::ResumeGap { .. } => StatusCode::GONE,
        SessionError::NotAttached | SessionError::Collision(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn session_error_response(id: Option<Value>, err: &SessionError) -> Response {
    rpc_response(session_error_status(err), session_error_to_json_rpc(id, err))
}

fn missing_session_response(id: Option<Value>) -> Response {
    rpc_response(
        StatusCode::BAD_REQUEST,
        json_rpc_error_with_data(
            id,
            INVALID_REQUEST,
            "Bad Request: no valid session ID provided",
            Some(json!({
                "code": "invalid_request",
                "message": "requests other than initialize must carry a session-id header",
                "details": {},
            })),
        ),
    )
}

fn rpc_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}
