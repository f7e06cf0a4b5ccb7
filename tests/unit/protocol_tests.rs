//! Unit tests for the JSON-RPC envelope model and typed payloads.

use serde_json::{json, Value};

use acp_mux::protocol::payloads::{
    InitializeParams, InitializeResult, NewSessionParams, NewSessionResult, SessionScoped,
};
use acp_mux::protocol::{
    decode_params, Envelope, Kind, RequestId, RpcError, Shape, INTERNAL_ERROR,
    SESSION_CREATION_FAILED, SESSION_NOT_FOUND,
};

// ── Classification ──────────────────────────────────────────────────────────

#[test]
fn request_notification_and_response_are_classified() {
    let req = Envelope::decode(r#"{"jsonrpc":"2.0","id":1,"method":"session/prompt"}"#).unwrap();
    assert!(matches!(
        req.kind().unwrap(),
        Kind::Request { method: "session/prompt", .. }
    ));

    let note = Envelope::decode(r#"{"jsonrpc":"2.0","method":"session/update"}"#).unwrap();
    assert!(matches!(
        note.kind().unwrap(),
        Kind::Notification { method: "session/update" }
    ));

    let resp = Envelope::decode(r#"{"jsonrpc":"2.0","id":"a","error":{"code":-1,"message":"x"}}"#)
        .unwrap();
    match resp.kind().unwrap() {
        Kind::Response { id } => assert_eq!(id, Some(&RequestId::from("a"))),
        other => panic!("expected a response, got {other:?}"),
    }
}

#[test]
fn mixed_call_and_response_is_rejected() {
    let env = Envelope::decode(r#"{"id":1,"method":"m","result":{}}"#).unwrap();
    assert!(env.kind().is_err());
}

#[test]
fn empty_object_is_neither_call_nor_response() {
    let env = Envelope::decode("{}").unwrap();
    assert!(env.kind().is_err());
}

#[test]
fn missing_jsonrpc_marker_is_tolerated() {
    let env = Envelope::decode(r#"{"id":1,"result":{}}"#).unwrap();
    assert_eq!(env.jsonrpc, "2.0");
}

// ── Request ids ─────────────────────────────────────────────────────────────

#[test]
fn numeric_ids_compare_by_value() {
    let a = Envelope::decode(r#"{"id":3,"result":{}}"#).unwrap();
    let b = Envelope::decode(r#"{"id":3.0,"result":{}}"#).unwrap();
    assert_eq!(a.id, b.id);
}

#[test]
fn string_and_numeric_ids_are_distinct() {
    assert_ne!(RequestId::from("3"), RequestId::Number(3));
}

#[test]
fn ids_serialize_in_original_form() {
    assert_eq!(serde_json::to_value(RequestId::Number(7)).unwrap(), json!(7));
    assert_eq!(serde_json::to_value(RequestId::from("x/1")).unwrap(), json!("x/1"));
}

#[test]
fn request_id_from_value_rejects_non_ids() {
    assert_eq!(RequestId::from_value(&Value::Null), None);
    assert_eq!(RequestId::from_value(&json!(true)), None);
    assert_eq!(RequestId::from_value(&json!(2.5)), None);
    assert_eq!(RequestId::from_value(&json!(-4)), Some(RequestId::Number(-4)));
}

// ── Serialization ───────────────────────────────────────────────────────────

#[test]
fn error_without_id_serializes_null_id() {
    let env = Envelope::error_response(None, RpcError::parse_error("eof"));
    let value: Value = serde_json::from_str(&env.to_line().unwrap()).unwrap();
    assert!(value.get("id").is_some_and(Value::is_null));
    assert_eq!(value["error"]["code"], -32700);
}

#[test]
fn notification_serializes_without_id() {
    let env = Envelope::notification("session/end", Some(json!({"sessionId": "s"})));
    let value: Value = serde_json::from_str(&env.to_line().unwrap()).unwrap();
    assert!(value.get("id").is_none());
    assert_eq!(value["jsonrpc"], "2.0");
}

#[test]
fn explicit_null_result_survives_reencoding() {
    let env = Envelope::decode(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
    let value: Value = serde_json::from_str(&env.to_line().unwrap()).unwrap();
    assert!(value.get("result").is_some_and(Value::is_null));
}

#[test]
fn unknown_params_fields_are_preserved() {
    let line = r#"{"jsonrpc":"2.0","id":1,"method":"session/prompt","params":{"sessionId":"s","_meta":{"k":1}}}"#;
    let env = Envelope::decode(line).unwrap();
    let value: Value = serde_json::from_str(&env.to_line().unwrap()).unwrap();
    assert_eq!(value["params"]["_meta"]["k"], 1);
}

// ── Session id rewriting ────────────────────────────────────────────────────

#[test]
fn rewrite_replaces_matching_session_id_only() {
    let mut env = Envelope::request(
        RequestId::Number(1),
        "session/prompt",
        Some(json!({"sessionId": "proxy-1", "prompt": []})),
    );
    assert!(!env.rewrite_session_id("other", "agent-1"));
    assert_eq!(env.session_id(), Some("proxy-1"));

    assert!(env.rewrite_session_id("proxy-1", "agent-1"));
    assert_eq!(env.session_id(), Some("agent-1"));
}

#[test]
fn rewrite_without_params_is_a_no_op() {
    let mut env = Envelope::notification("x", None);
    assert!(!env.rewrite_session_id("a", "b"));
}

// ── Shape sniffing ──────────────────────────────────────────────────────────

#[test]
fn shape_detects_response_and_call() {
    let response = Shape::of(&json!({"id": 1.5, "result": {}}));
    assert!(response.response_shaped);
    assert!(!response.has_method);

    let call = Shape::of(&json!({"id": 4, "method": 5}));
    assert!(call.has_method);
    assert!(!call.response_shaped);
    assert_eq!(call.id, Some(RequestId::Number(4)));

    let scalar = Shape::of(&json!([1, 2]));
    assert!(!scalar.has_method && !scalar.response_shaped && scalar.id.is_none());
}

// ── Error objects ───────────────────────────────────────────────────────────

#[test]
fn proxy_error_messages() {
    let failed = RpcError::session_creation_failed("timeout: no reply");
    assert_eq!(failed.code, SESSION_CREATION_FAILED);
    assert_eq!(failed.message, "Session creation failed: timeout: no reply");

    let missing = RpcError::session_not_found("ghost");
    assert_eq!(missing.code, SESSION_NOT_FOUND);
    assert_eq!(missing.message, "Session not found: ghost");

    assert_eq!(RpcError::internal("boom").code, INTERNAL_ERROR);
}

// ── Payloads ────────────────────────────────────────────────────────────────

#[test]
fn initialize_result_advertises_multi_session() {
    let value = serde_json::to_value(InitializeResult::new(json!(1), "acp-mux")).unwrap();
    assert_eq!(value["protocolVersion"], 1);
    assert_eq!(value["capabilities"]["multiSession"], true);
    assert_eq!(value["serverInfo"]["name"], "acp-mux");
    assert_eq!(value["authMethods"], json!([]));
}

#[test]
fn initialize_params_keep_unknown_fields() {
    let params: InitializeParams = decode_params(Some(json!({
        "protocolVersion": 1,
        "clientCapabilities": {"terminal": true},
        "_meta": {"trace": "abc"}
    })))
    .unwrap();
    let value = serde_json::to_value(&params).unwrap();
    assert_eq!(value["clientCapabilities"]["terminal"], true);
    assert_eq!(value["_meta"]["trace"], "abc");
}

#[test]
fn absent_params_decode_as_empty_object() {
    let params: NewSessionParams = decode_params(None).unwrap();
    assert!(params.cwd.is_none());
    assert!(params.mcp_servers.is_none());
}

#[test]
fn new_session_result_merges_extensions() {
    let mut result: NewSessionResult = serde_json::from_value(json!({
        "sessionId": "agent-1",
        "models": {"currentModelId": "m"}
    }))
    .unwrap();
    result.session_id = "proxy-1".into();

    let value = serde_json::to_value(result).unwrap();
    assert_eq!(value["sessionId"], "proxy-1");
    assert_eq!(value["models"]["currentModelId"], "m");
}

#[test]
fn session_scoped_requires_session_id() {
    assert!(decode_params::<SessionScoped>(Some(json!({"prompt": []}))).is_err());
    let scoped: SessionScoped = decode_params(Some(json!({"sessionId": "s", "x": 1}))).unwrap();
    assert_eq!(scoped.session_id, "s");
    assert_eq!(scoped.extensions["x"], 1);
}
