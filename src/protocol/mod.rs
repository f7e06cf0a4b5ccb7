//! JSON-RPC 2.0 wire model for the ACP dialect spoken on both sides of the proxy.
//!
//! [`Envelope`] is deliberately loose: `params` and `result` stay opaque
//! [`serde_json::Value`]s and are decoded into the typed structs in
//! [`payloads`] only by the component that needs them. Everything the proxy
//! does not rewrite passes through byte-for-byte equivalent.

pub mod payloads;

use std::fmt::{Display, Formatter};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::{AppError, Result};

/// JSON-RPC protocol version stamped on every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not handled by the proxy.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal proxy error.
pub const INTERNAL_ERROR: i64 = -32603;
/// The agent failed to start, initialize, or create its session.
pub const SESSION_CREATION_FAILED: i64 = -32000;
/// The `sessionId` is not present in the session registry.
pub const SESSION_NOT_FOUND: i64 = -32001;

// ── Request id ────────────────────────────────────────────────────────────────

/// Normalized JSON-RPC request id.
///
/// Integral numbers (including `1.0`) collapse to [`RequestId::Number`] so
/// that ids compare by value regardless of how the peer encoded them.
/// Fractional numbers are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl RequestId {
    /// Decode an id from a raw JSON value. `null` and non-id shapes yield `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => number_to_id(n),
            _ => None,
        }
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::String(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| de::Error::custom(format!("invalid request id: {value}")))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_id(n: &serde_json::Number) -> Option<RequestId> {
    if let Some(i) = n.as_i64() {
        return Some(RequestId::Number(i));
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(RequestId::Number(f as i64))
    } else {
        None
    }
}

// ── Error object ──────────────────────────────────────────────────────────────

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Build an error with the given code and message.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// `-32700` for a line that is not JSON at all.
    #[must_use]
    pub fn parse_error(detail: impl Display) -> Self {
        Self::new(PARSE_ERROR, format!("Parse error: {detail}"))
    }

    /// `-32600` for JSON that is not a valid envelope.
    #[must_use]
    pub fn invalid_request(detail: impl Display) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {detail}"))
    }

    /// `-32601` for a method the proxy does not handle.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    /// `-32602` for params that do not decode into the method's payload.
    #[must_use]
    pub fn invalid_params(detail: impl Display) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"))
    }

    /// `-32603` for failures inside the proxy.
    #[must_use]
    pub fn internal(detail: impl Display) -> Self {
        Self::new(INTERNAL_ERROR, format!("Internal error: {detail}"))
    }

    /// `-32000` carrying the underlying creation failure.
    #[must_use]
    pub fn session_creation_failed(reason: impl Display) -> Self {
        Self::new(
            SESSION_CREATION_FAILED,
            format!("Session creation failed: {reason}"),
        )
    }

    /// `-32001` for an unknown proxy session id.
    #[must_use]
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(SESSION_NOT_FOUND, format!("Session not found: {session_id}"))
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Classification of a decoded envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind<'a> {
    /// A call that expects exactly one response.
    Request {
        /// Correlation id.
        id: &'a RequestId,
        /// Method name.
        method: &'a str,
    },
    /// A call that must never be answered.
    Notification {
        /// Method name.
        method: &'a str,
    },
    /// A reply to an earlier request; `id` is `None` only for `null`-id errors.
    Response {
        /// Correlation id of the answered request.
        id: Option<&'a RequestId>,
    },
}

/// One JSON-RPC message: request, notification, or response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Protocol version marker; peers that omit it are tolerated.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Correlation id; absent on notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Method name; present only on calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Call parameters.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<Value>,
    /// Successful result; `Some(Value::Null)` when the peer sent `"result": null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_owned()
}

/// Keep an explicit JSON `null` distinguishable from an absent field.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Build a request.
    #[must_use]
    pub fn request(id: RequestId, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: Some(method.to_owned()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a notification.
    #[must_use]
    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: None,
            method: Some(method.to_owned()),
            params,
            result: None,
            error: None,
        }
    }

    /// Build a successful response.
    #[must_use]
    pub fn response(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response. `id` is `None` only when the request id
    /// could not be determined (serialized as `"id": null`).
    #[must_use]
    pub fn error_response(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            method: None,
            params: None,
            result: None,
            error: Some(error),
        }
    }

    /// Decode one NDJSON line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the line is not a JSON-RPC object.
    pub fn decode(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| AppError::Protocol(format!("malformed json: {e}")))
    }

    /// Decode an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if the value is not a JSON-RPC object.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| AppError::Protocol(format!("invalid envelope: {e}")))
    }

    /// Serialize to a single line without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| AppError::Protocol(format!("failed to serialise envelope: {e}")))?;
        if self.id.is_none() && self.method.is_none() {
            if let Value::Object(map) = &mut value {
                map.insert("id".to_owned(), Value::Null);
            }
        }
        Ok(value.to_string())
    }

    /// Classify the envelope, enforcing that it is either a call or a
    /// response and never both.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] for envelopes that mix call and response
    /// fields, or carry neither.
    pub fn kind(&self) -> Result<Kind<'_>> {
        let is_response = self.result.is_some() || self.error.is_some();
        match (&self.method, is_response) {
            (Some(_), true) => Err(AppError::Protocol(
                "envelope carries both a method and a result/error".into(),
            )),
            (Some(method), false) => Ok(match &self.id {
                Some(id) => Kind::Request { id, method },
                None => Kind::Notification { method },
            }),
            (None, true) => Ok(Kind::Response {
                id: self.id.as_ref(),
            }),
            (None, false) => Err(AppError::Protocol(
                "envelope carries neither a method nor a result/error".into(),
            )),
        }
    }

    /// The `sessionId` string inside `params`, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|p| p.get("sessionId"))
            .and_then(Value::as_str)
    }

    /// Replace `params.sessionId` when it currently equals `from`.
    ///
    /// Returns `true` when a rewrite happened.
    pub fn rewrite_session_id(&mut self, from: &str, to: &str) -> bool {
        let Some(Value::Object(params)) = self.params.as_mut() else {
            return false;
        };
        match params.get_mut("sessionId") {
            Some(Value::String(current)) if current == from => {
                *current = to.to_owned();
                true
            }
            _ => false,
        }
    }
}

// ── Shape sniffing ────────────────────────────────────────────────────────────

/// What can be learned from a JSON value that failed envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// The value carries a `method` key.
    pub has_method: bool,
    /// No method, but an id plus `result` or `error`.
    pub response_shaped: bool,
    /// The id, if it is a valid request id.
    pub id: Option<RequestId>,
}

impl Shape {
    /// Inspect a raw JSON value.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self {
                has_method: false,
                response_shaped: false,
                id: None,
            };
        };
        let has_method = obj.contains_key("method");
        let has_id = obj.get("id").is_some_and(|v| !v.is_null());
        let has_outcome = obj.contains_key("result") || obj.contains_key("error");
        Self {
            has_method,
            response_shaped: !has_method && has_id && has_outcome,
            id: obj.get("id").and_then(RequestId::from_value),
        }
    }
}

/// Decode optional `params` into a typed payload, treating absent params as
/// an empty object.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] when the params do not match `T`.
pub fn decode_params<T: de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let value = params.unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value).map_err(|e| AppError::Protocol(e.to_string()))
}

/// Empty JSON object, the result of `session/end`.
#[must_use]
pub fn empty_result() -> Value {
    json!({})
}
