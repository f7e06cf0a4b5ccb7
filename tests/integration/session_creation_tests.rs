//! Integration tests for `session/new`.
//!
//! Covers the handshake happy path, every creation failure mode (each must
//! yield `-32000` and dispose of the partial session), workspace path
//! translation, and the unroutable-until-created rule.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use acp_mux::config::WorkspaceMapping;
use acp_mux::protocol::{SESSION_CREATION_FAILED, SESSION_NOT_FOUND};

use super::test_helpers::{request, Harness, HarnessOptions};

const QUIET: Duration = Duration::from_millis(150);

fn session_new(id: u64) -> serde_json::Value {
    request(
        id,
        "session/new",
        json!({"cwd": "/tmp/acp-mux-test", "mcpServers": []}),
    )
}

// ── Happy path ──────────────────────────────────────────────────────────────

/// The editor sees the proxy session id, never the agent's.
#[tokio::test]
async fn session_new_returns_proxy_session_id() {
    let mut h = Harness::new();
    let (proxy_id, agent) = h.open_session(1, "agent-sess-1").await;

    assert!(!proxy_id.is_empty());
    assert_ne!(proxy_id, "agent-sess-1");
    assert_eq!(agent.agent_name, "mock-agent");
    assert_eq!(h.dispatcher.registry().len().await, 1);
}

/// The agent receives `initialize` then `session/new`, with the reserved ids.
#[tokio::test]
async fn handshake_uses_reserved_request_ids() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(1));
    let mut agent = h.next_agent().await;
    let (init, new) = agent.handshake("agent-sess").await;
    pending.await.unwrap().unwrap();

    let reply = h.editor.recv().await;
    let proxy_id = reply["result"]["sessionId"].as_str().unwrap();
    assert_eq!(init["id"], format!("init-{proxy_id}"));
    assert_eq!(new["id"], format!("session-new-{proxy_id}"));
}

/// Handshake replies never reach the editor; only the final result does.
#[tokio::test]
async fn handshake_replies_are_not_forwarded() {
    let mut h = Harness::new();
    let _session = h.open_session(1, "agent-sess").await;

    assert!(h.editor.try_recv(Duration::from_millis(150)).await.is_none());
}

/// Cached editor capabilities are forwarded in each agent's `initialize`.
#[tokio::test]
async fn editor_initialize_params_are_forwarded_to_agent() {
    let mut h = Harness::new();
    h.dispatch(request(
        1,
        "initialize",
        json!({
            "protocolVersion": 1,
            "clientCapabilities": {"fs": {"readTextFile": true}},
            "clientInfo": {"name": "zed"}
        }),
    ))
    .await;
    let _ = h.editor.recv().await;

    let pending = h.submit(session_new(2));
    let mut agent = h.next_agent().await;
    let (init, _) = agent.handshake("agent-sess").await;
    pending.await.unwrap().unwrap();

    assert_eq!(init["params"]["protocolVersion"], 1);
    assert_eq!(init["params"]["clientCapabilities"]["fs"]["readTextFile"], true);
    assert_eq!(init["params"]["clientInfo"]["name"], "zed");
}

/// Without a prior `initialize` the agent still gets a usable handshake.
#[tokio::test]
async fn agent_initialize_falls_back_without_editor_initialize() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(1));
    let mut agent = h.next_agent().await;
    let (init, _) = agent.handshake("agent-sess").await;
    pending.await.unwrap().unwrap();

    assert_eq!(init["params"]["protocolVersion"], 1);
    assert!(init["params"]["clientCapabilities"].is_object());
}

/// Vendor fields from the agent's result are merged through.
#[tokio::test]
async fn agent_extension_fields_are_merged_into_result() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(1));
    let mut agent = h.next_agent().await;

    let init = agent.recv().await;
    agent.reply(&init, json!({"protocolVersion": 1})).await;
    let new = agent.recv().await;
    agent
        .reply(
            &new,
            json!({
                "sessionId": "agent-sess",
                "modes": {"currentModeId": "ask", "availableModes": []},
                "_meta": {"vendor": true}
            }),
        )
        .await;
    pending.await.unwrap().unwrap();

    let reply = h.editor.recv().await;
    let result = &reply["result"];
    assert_ne!(result["sessionId"], "agent-sess");
    assert_eq!(result["modes"]["currentModeId"], "ask");
    assert_eq!(result["_meta"]["vendor"], true);
}

/// Two `session/new` calls in flight at once get distinct proxy ids, each
/// mapped to its own agent session.
#[tokio::test]
async fn concurrent_session_new_yields_distinct_sessions() {
    let mut h = Harness::new();
    let first = h.submit(session_new(1));
    let second = h.submit(session_new(2));

    // Both agents are spawned before either handshake completes.
    let mut agent_x = h.next_agent().await;
    let mut agent_y = h.next_agent().await;
    tokio::join!(agent_x.handshake("agent-X"), agent_y.handshake("agent-Y"));
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let a = h.editor.recv().await;
    let b = h.editor.recv().await;
    let mut by_request = [a, b];
    by_request.sort_by_key(|reply| reply["id"].as_u64());
    let proxy_one = by_request[0]["result"]["sessionId"].as_str().unwrap().to_owned();
    let proxy_two = by_request[1]["result"]["sessionId"].as_str().unwrap().to_owned();
    assert_ne!(proxy_one, proxy_two);

    let mut ids = h.dispatcher.registry().ids().await;
    ids.sort();
    let mut expected = vec![proxy_one.clone(), proxy_two.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    // Each proxy id reaches exactly one agent, under that agent's own id.
    let mut seen = Vec::new();
    for (n, proxy_id) in [(10, &proxy_one), (11, &proxy_two)] {
        h.dispatch(request(
            n,
            "session/prompt",
            json!({"sessionId": proxy_id, "prompt": []}),
        ))
        .await;
        let on_x = agent_x.try_recv(QUIET).await;
        let on_y = agent_y.try_recv(QUIET).await;
        let (agent_sid, prompt) = match (on_x, on_y) {
            (Some(prompt), None) => ("agent-X", prompt),
            (None, Some(prompt)) => ("agent-Y", prompt),
            other => panic!("prompt {n} must reach exactly one agent: {other:?}"),
        };
        assert_eq!(prompt["id"], n);
        assert_eq!(prompt["params"]["sessionId"], agent_sid);
        seen.push(agent_sid);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec!["agent-X", "agent-Y"]);
}

// ── Failures ────────────────────────────────────────────────────────────────

/// Scenario B: an agent that never answers `initialize` yields `-32000`
/// after the handshake bound, and the partial session is disposed.
#[tokio::test]
async fn handshake_timeout_is_session_creation_failed() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(2));
    let mut agent = h.next_agent().await;
    let init = agent.recv().await;
    assert_eq!(init["method"], "initialize");

    pending.await.unwrap().unwrap();
    let reply = h.editor.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    let message = reply["error"]["message"].as_str().unwrap();
    assert!(message.starts_with("Session creation failed:"), "{message}");
    assert!(message.contains("initialize"), "{message}");

    assert!(h.dispatcher.registry().is_empty().await);
    assert!(agent.next().await.is_none(), "agent input must be closed");
}

/// A timeout on the second round-trip fails the same way.
#[tokio::test]
async fn session_new_timeout_is_session_creation_failed() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(3));
    let mut agent = h.next_agent().await;
    let init = agent.recv().await;
    agent.reply(&init, json!({"protocolVersion": 1})).await;
    let new = agent.recv().await;
    assert_eq!(new["method"], "session/new");

    pending.await.unwrap().unwrap();
    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("session/new"));
    assert!(h.dispatcher.registry().is_empty().await);
}

/// An error result from the agent fails creation with its message.
#[tokio::test]
async fn agent_error_result_is_session_creation_failed() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(4));
    let mut agent = h.next_agent().await;
    let init = agent.recv().await;
    agent
        .send(json!({
            "jsonrpc": "2.0",
            "id": init["id"],
            "error": {"code": -32603, "message": "auth required"}
        }))
        .await;

    pending.await.unwrap().unwrap();
    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("auth required"));
}

/// An empty agent session id is a failure.
#[tokio::test]
async fn empty_agent_session_id_is_session_creation_failed() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(5));
    let mut agent = h.next_agent().await;
    let init = agent.recv().await;
    agent.reply(&init, json!({"protocolVersion": 1})).await;
    let new = agent.recv().await;
    agent.reply(&new, json!({"sessionId": ""})).await;

    pending.await.unwrap().unwrap();
    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no sessionId"));
    assert!(h.dispatcher.registry().is_empty().await);
}

/// An agent that exits during the handshake fails creation promptly.
#[tokio::test]
async fn agent_exit_during_handshake_is_session_creation_failed() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(6));
    let mut agent = h.next_agent().await;
    let _init = agent.recv().await;
    drop(agent);

    pending.await.unwrap().unwrap();
    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
}

/// A spawner failure is reported with its diagnostic reason.
#[tokio::test]
async fn spawn_failure_is_session_creation_failed() {
    let mut h = Harness::with_options(HarnessOptions {
        failing_spawner: Some("no such binary".into()),
        ..HarnessOptions::default()
    });
    h.dispatch(session_new(7)).await;

    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    assert!(reply["error"]["message"]
        .as_str()
        .unwrap()
        .contains("no such binary"));
}

/// A relative `cwd` cannot be resolved to a workspace.
#[tokio::test]
async fn relative_cwd_is_session_creation_failed() {
    let mut h = Harness::new();
    h.dispatch(request(8, "session/new", json!({"cwd": "relative/dir"})))
        .await;

    let reply = h.editor.recv().await;
    assert_eq!(reply["error"]["code"], SESSION_CREATION_FAILED);
    assert!(h.agents.try_recv().is_err(), "no agent may be spawned");
}

// ── Path translation ────────────────────────────────────────────────────────

/// `cwd` and launch specs are rewritten into the agent's view.
#[tokio::test]
async fn cwd_and_launch_specs_are_translated() {
    let mut h = Harness::with_options(HarnessOptions {
        mappings: vec![WorkspaceMapping {
            host_root: PathBuf::from("/home/dev/proj"),
            container_root: PathBuf::from("/workspace"),
        }],
        ..HarnessOptions::default()
    });
    let pending = h.submit(request(
        1,
        "session/new",
        json!({
            "cwd": "/home/dev/proj/app",
            "mcpServers": [{
                "name": "files",
                "command": "/home/dev/proj/bin/server",
                "args": ["--root=/home/dev/proj", "--verbose", "/etc/hosts"],
                "env": [{"name": "DATA", "value": "/home/dev/proj/data"}]
            }]
        }),
    ));
    let mut agent = h.next_agent().await;
    let (_, new) = agent.handshake("agent-sess").await;
    pending.await.unwrap().unwrap();

    let params = &new["params"];
    assert_eq!(params["cwd"], "/workspace/app");
    let server = &params["mcpServers"][0];
    assert_eq!(server["name"], "files");
    assert_eq!(server["command"], "/workspace/bin/server");
    assert_eq!(server["args"], json!(["--root=/workspace", "--verbose", "/etc/hosts"]));
    assert_eq!(server["env"][0]["name"], "DATA");
    assert_eq!(server["env"][0]["value"], "/workspace/data");
}

/// Without a `cwd` the proxy's default working directory is used.
#[tokio::test]
async fn missing_cwd_uses_default() {
    let mut h = Harness::new();
    let pending = h.submit(request(1, "session/new", json!({})));
    let mut agent = h.next_agent().await;
    let (_, new) = agent.handshake("agent-sess").await;
    pending.await.unwrap().unwrap();

    assert_eq!(new["params"]["cwd"], "/tmp/acp-mux-test");
}

// ── Mid-creation ────────────────────────────────────────────────────────────

/// A prompt for a session still in its handshake is `SessionNotFound`;
/// the session becomes routable once creation completes.
#[tokio::test]
async fn prompt_during_creation_is_session_not_found() {
    let mut h = Harness::new();
    let pending = h.submit(session_new(20));
    let mut agent = h.next_agent().await;

    let init = agent.recv().await;
    let proxy_id = init["id"]
        .as_str()
        .and_then(|id| id.strip_prefix("init-"))
        .unwrap()
        .to_owned();

    h.dispatch(request(
        21,
        "session/prompt",
        json!({"sessionId": proxy_id, "prompt": []}),
    ))
    .await;
    let early = h.editor.recv().await;
    assert_eq!(early["id"], 21);
    assert_eq!(early["error"]["code"], SESSION_NOT_FOUND);

    agent.reply(&init, json!({"protocolVersion": 1})).await;
    let new = agent.recv().await;
    agent.reply(&new, json!({"sessionId": "agent-sess"})).await;
    pending.await.unwrap().unwrap();

    let created = h.editor.recv().await;
    assert_eq!(created["id"], 20);
    assert_eq!(created["result"]["sessionId"], proxy_id.as_str());

    h.dispatch(request(
        22,
        "session/prompt",
        json!({"sessionId": proxy_id, "prompt": []}),
    ))
    .await;
    let forwarded = agent.recv().await;
    assert_eq!(forwarded["id"], 22);
    assert_eq!(forwarded["params"]["sessionId"], "agent-sess");
}
