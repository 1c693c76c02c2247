use crate::common;
use crate::session_env;
use crate::FACTORIAL_APP;
use pdbmux::ui::server::Server;
use pdbmux::ui::tools::{call, Tool};
use pdbmux::ui::transport::{FramedTransport, Transport};
use serde_json::{json, Value};
use serial_test::serial;
use std::io::Cursor;
use std::sync::Arc;

#[test]
#[serial]
fn test_tool_calls() {
    session_env!(registry, {
        let started = call(
            &registry,
            Tool::StartDebug,
            json!({"target": FACTORIAL_APP, "mode": "script"}),
        )
        .unwrap();
        assert_eq!(started["status"], "started");
        let session_id = started["session_id"].as_str().unwrap().to_string();

        let brkpt = call(
            &registry,
            Tool::SetBreakpoint,
            json!({"session_id": session_id, "file": FACTORIAL_APP, "line": 2}),
        )
        .unwrap();
        assert_eq!(brkpt["breakpoint_id"], 1);
        assert_eq!(brkpt["location"]["file"], common::fixture(FACTORIAL_APP));

        let stop = call(
            &registry,
            Tool::ContinueExecution,
            json!({"session_id": session_id}),
        )
        .unwrap();
        assert_eq!(stop["reason"], "breakpoint");
        assert_eq!(stop["stopped_at"]["line"], 2);
        assert_eq!(stop["stopped_at"]["function"], "factorial");

        let eval = call(
            &registry,
            Tool::Evaluate,
            json!({"session_id": session_id, "expression": "1/0"}),
        )
        .unwrap();
        assert!(eval["error"].as_str().unwrap().contains("ZeroDivisionError"));

        let frames = call(
            &registry,
            Tool::WhereStack,
            json!({"session_id": session_id, "limit": 1}),
        )
        .unwrap();
        assert_eq!(frames["items"][0]["function"], "factorial");
        assert_eq!(frames["pagination"]["returned"], 1);
        assert!(frames["pagination"]["total"].as_u64().unwrap() >= 3);

        let vars = call(
            &registry,
            Tool::ListVariables,
            json!({"session_id": session_id}),
        )
        .unwrap();
        assert_eq!(
            vars["locals"]["items"],
            json!([{"name": "n", "type": "int", "value": "5"}])
        );
        assert!(vars.get("globals").is_none());

        let state = call(
            &registry,
            Tool::SessionState,
            json!({"session_id": session_id}),
        )
        .unwrap();
        assert_eq!(state["state"], "AT_PROMPT");
        assert_eq!(state["breakpoints"], 1);

        let stopped = call(&registry, Tool::StopDebug, json!({"session_id": session_id})).unwrap();
        assert_eq!(stopped["status"], "stopped");
        let stopped = call(&registry, Tool::StopDebug, json!({"session_id": session_id})).unwrap();
        assert_eq!(stopped["status"], "stopped");
    });
}

fn request(seq: i64, command: &str, arguments: Value) -> Vec<u8> {
    let payload = serde_json::to_vec(&json!({
        "seq": seq,
        "type": "request",
        "command": command,
        "arguments": arguments,
    }))
    .unwrap();
    let mut buf = format!("Content-Length: {}\r\n\r\n", payload.len()).into_bytes();
    buf.extend(payload);
    buf
}

#[test]
#[serial]
fn test_server_eof_stops_sessions() {
    session_env!(registry, {
        let input = request(1, "start_debug", json!({"target": FACTORIAL_APP}));
        let transport = Arc::new(FramedTransport::new(Cursor::new(input), vec![]));
        Server::new(transport.clone(), registry.clone(), None)
            .run()
            .unwrap();

        assert!(registry.list().is_empty());
        let out = Arc::try_unwrap(transport).ok().unwrap().into_writer();
        let responses = FramedTransport::new(Cursor::new(out), vec![]);
        let response = responses.read_message().unwrap().unwrap();
        assert_eq!(response["request_seq"], 1);
        assert_eq!(response["success"], true);
        let session_id = response["body"]["session_id"].as_str().unwrap();
        assert!(registry.get(session_id).is_err());
    });
}
