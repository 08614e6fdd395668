//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides standardized mapping of tool and session errors to valid JSON-RPC payloads.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::errors::{SessionError, ToolError};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const TOOL_EXECUTION_ERROR: i32 = -32000;
pub const SESSION_CLOSED: i32 = -32001;
pub const STREAM_ALREADY_OPEN: i32 = -32002;
pub const RESUME_GAP: i32 = -32003;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn tool_error_to_json_rpc(id: Option<Value>, err: ToolError) -> Value {
    match err {
        ToolError::UnknownTool { name } => json_rpc_error_with_data(
            id,
            METHOD_NOT_FOUND,
            "Method not found",
            Some(json!({
                "code": "tool_not_found",
                "message": "unknown tool name",
                "details": { "name": name },
            })),
        ),
        ToolError::InvalidArguments { field, message } => json_rpc_error_with_data(
            id,
            INVALID_PARAMS,
            "Invalid params",
            Some(json!({
                "code": "invalid_arguments",
                "message": format!("{field} {message}"),
                "details": { "field": field },
            })),
        ),
        ToolError::Execution { tool, message } => json_rpc_error_with_data(
            id,
            TOOL_EXECUTION_ERROR,
            "Tool execution failed",
            Some(json!({
                "code": "tool_execution_error",
                "message": message,
                "details": { "name": tool },
            })),
        ),
        ToolError::DuplicateToolName { name } => json_rpc_error_with_data(
            id,
            INTERNAL_ERROR,
            "Internal error",
            Some(json!({
                "code": "duplicate_tool_name",
                "message": "tool name is already registered",
                "details": { "name": name },
            })),
        ),
        ToolError::Internal { .. } => json_rpc_error(id, INTERNAL_ERROR, "Internal error"),
    }
}

pub fn session_error_to_json_rpc(id: Option<Value>, err: &SessionError) -> Value {
    let (code, message, data_code) = match err {
        SessionError::UnknownSession => (
            INVALID_REQUEST,
            "Bad Request: unknown session",
            "unknown_session",
        ),
        SessionError::SessionClosed => (SESSION_CLOSED, "Session closed", "session_closed"),
        SessionError::StreamAlreadyOpen => (
            STREAM_ALREADY_OPEN,
            "Event stream already open",
            "stream_already_open",
        ),
        SessionError::ResumeGap { .. } => (RESUME_GAP, "Cannot resume event stream", "resume_gap"),
        SessionError::NotAttached | SessionError::Collision(_) => {
            (INTERNAL_ERROR, "Internal error", "internal_error")
        }
    };

    json_rpc_error_with_data(
        id,
        code,
        message,
        Some(json!({
            "code": data_code,
            "message": err.to_string(),
            "details": {},
        })),
    )
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data,
            message: message.to_string(),
        },
        id.as_ref().and_then(value_to_request_id),
    );
    to_response_value(response, id)
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        return to_response_value(response, id);
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn to_response_value(response: impl Serialize, id: Option<Value>) -> Value {
    serde_json::to_value(response).unwrap_or_else(|err| {
        error!(error = %err, "jsonrpc response serialization failed");
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": INTERNAL_ERROR, "message": "Internal error" }
        })
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}
