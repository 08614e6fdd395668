//! The per-session Model Context Protocol engine
//!
//! Decodes JSON-RPC messages delivered to a session transport, performs the
//! `initialize` handshake, and routes `tools/*` calls to the dispatcher.

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, CallToolResult, Implementation, InitializeRequest,
    InitializeResult, JsonrpcMessage, JsonrpcRequest, ListToolsRequest, ListToolsResult,
    PingRequest, ServerCapabilities, ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::errors::AppError;
use crate::mcp::dispatcher::{ToolContext, ToolDispatcher};
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_error_with_data, json_rpc_result,
    request_id_to_value, tool_error_to_json_rpc, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::session::transport::{Handshake, Transport};

/// Newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

const SERVER_INSTRUCTIONS: &str =
    "Weather tools: current conditions, forecasts, air quality and combined reports by city name.";

/// True for a single `initialize` request, the only message accepted without a session.
pub fn is_initialize_request(payload: &Value) -> bool {
    payload.get("method").and_then(Value::as_str) == Some("initialize")
        && payload.get("id").is_some_and(|id| !id.is_null())
}

/// Handles a single message or a batch; `None` when nothing needs answering.
pub async fn handle_json_rpc_payload(
    transport: &Transport,
    dispatcher: &ToolDispatcher,
    payload: Value,
) -> Option<Value> {
    let Value::Array(batch) = payload else {
        return handle_json_rpc_value(transport, dispatcher, payload).await;
    };

    if batch.is_empty() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let mut responses = Vec::new();
    for item in batch {
        if let Some(response) = handle_json_rpc_value(transport, dispatcher, item).await {
            responses.push(response);
        }
    }

    (!responses.is_empty()).then_some(Value::Array(responses))
}

pub async fn handle_json_rpc_value(
    transport: &Transport,
    dispatcher: &ToolDispatcher,
    payload: Value,
) -> Option<Value> {
    if !payload.is_object() {
        return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let request_id = payload.get("id").cloned();
    let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request")),
    };

    match parsed {
        JsonrpcMessage::Request(request) => {
            if let Err(error_response) = validate_request_shape(&request) {
                return Some(error_response);
            }

            let request_id = request_id_to_value(request.id);
            if request.method.trim().is_empty() {
                return Some(json_rpc_error(Some(request_id), INVALID_REQUEST, "Invalid Request"));
            }

            Some(
                handle_json_rpc_request(
                    transport,
                    dispatcher,
                    Some(request_id),
                    request.method,
                    request.params.map(Value::Object),
                )
                .await,
            )
        }
        JsonrpcMessage::Notification(notification) => {
            debug!(
                session_id = %transport.session_id(),
                method = %notification.method,
                "notification received"
            );
            None
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
            Some(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
        }
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let request_id = Some(request_id_to_value(request.id.clone()));
    let payload = match serde_json::to_value(request) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, "jsonrpc request re-serialization failed");
            return Err(json_rpc_error(request_id, INTERNAL_ERROR, "Internal error"));
        }
    };

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

pub async fn handle_json_rpc_request(
    transport: &Transport,
    dispatcher: &ToolDispatcher,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
) -> Value {
    let audit_params = redact_audit_params(params.as_ref());

    let response = match method.as_str() {
        "initialize" => handle_initialize(transport, id, params.as_ref()),
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => handle_tools_list(dispatcher, id),
        "tools/call" => handle_tools_call(transport, dispatcher, id, params).await,
        _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
    };

    info!(
        session_id = %transport.session_id(),
        method = %method,
        params = %audit_params,
        outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
        "mcp action audited"
    );

    response
}

fn handle_tools_list(dispatcher: &ToolDispatcher, id: Option<Value>) -> Value {
    let listed = dispatcher
        .tools()
        .map(|tool| tool.to_tool())
        .collect::<Result<Vec<_>, _>>()
        .and_then(|tools| {
            serde_json::to_value(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools,
            })
        });

    match listed {
        Ok(result) => json_rpc_result(id, result),
        Err(err) => {
            error!(error = %err, "failed to serialize tools list");
            json_rpc_error(id, INTERNAL_ERROR, "Internal error")
        }
    }
}

fn handle_initialize(transport: &Transport, id: Option<Value>, params: Option<&Value>) -> Value {
    let protocol_version = match negotiate_protocol_version(params) {
        Ok(version) => version,
        Err(AppError::BadRequest { code, message }) => {
            return json_rpc_error_with_data(
                id,
                INVALID_PARAMS,
                "Invalid params",
                Some(json!({ "code": code, "message": message, "details": {} })),
            )
        }
        Err(_) => return json_rpc_error(id, INTERNAL_ERROR, "Internal error"),
    };

    let client_name = params
        .and_then(|params| params.pointer("/clientInfo/name"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let first_handshake = transport.record_handshake(Handshake {
        protocol_version: protocol_version.clone(),
        client_name,
    });
    if !first_handshake {
        return json_rpc_error_with_data(
            id,
            INVALID_REQUEST,
            "Invalid Request",
            Some(json!({
                "code": "already_initialized",
                "message": "session is already initialized",
                "details": {},
            })),
        );
    }

    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: None,
            prompts: None,
            ..Default::default()
        },
        protocol_version,
        instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        meta: None,
    };

    match serde_json::to_value(initialize_result) {
        Ok(result) => json_rpc_result(id, result),
        Err(err) => {
            error!(error = %err, "initialize result serialization failed");
            json_rpc_error(id, INTERNAL_ERROR, "Internal error")
        }
    }
}

async fn handle_tools_call(
    transport: &Transport,
    dispatcher: &ToolDispatcher,
    id: Option<Value>,
    params: Option<Value>,
) -> Value {
    let Some(raw_params) = params else {
        return json_rpc_error(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return json_rpc_error(id, INVALID_PARAMS, "Invalid params"),
    };

    let ctx = ToolContext::new(
        transport.session_id().clone(),
        tool_call.name.as_str(),
        transport.events().clone(),
    );

    match dispatcher
        .invoke(&tool_call.name, tool_call.arguments.map(Value::Object), ctx)
        .await
    {
        Ok(output) => match serde_json::to_value(CallToolResult::from(output)) {
            Ok(result) => json_rpc_result(id, result),
            Err(err) => {
                error!(tool = %tool_call.name, error = %err, "tool result serialization failed");
                json_rpc_error(id, INTERNAL_ERROR, "Internal error")
            }
        },
        Err(err) => tool_error_to_json_rpc(id, err),
    }
}

/// Picks the offered version when supported, otherwise the newest supported one.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<String, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    let negotiated = SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|supported| **supported == offered_version)
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION);

    Ok(negotiated.to_string())
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "authorization" | "bearer" | "appid" | "apikey")
        || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
        || normalized.contains("api_key")
}
