//! Newline-delimited JSON framing for the RPC listener.
//!
//! One request per line, one response per line:
//! ```text
//! → {"id":7,"method":"ping"}
//! ← {"id":7,"result":"pong"}
//! → {"id":8,"method":"nope"}
//! ← {"id":8,"error":{"code":-32601,"message":"unknown method 'nope'"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcErrorBody {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Parse one request line. A malformed line yields the error response to send back.
pub fn parse_request(line: &str) -> Result<RpcRequest, RpcResponse> {
    serde_json::from_str(line)
        .map_err(|error| RpcResponse::error(0, PARSE_ERROR, format!("invalid request: {error}")))
}

/// Serialize `response` followed by a newline into `buf`.
pub fn encode(response: &RpcResponse, buf: &mut Vec<u8>) -> serde_json::Result<()> {
    buf.clear();
    serde_json::to_writer(&mut *buf, response)?;
    buf.push(b'\n');
    Ok(())
}
