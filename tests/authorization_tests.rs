//! End-to-end authorization tests
//!
//! Drives full JSON-RPC messages through the dispatcher and chain:
//! - Per-role tool visibility
//! - Existence hiding for denied and unknown tools
//! - Disabled tools
//! - Credential rejection before the chain
//! - Faults, timeouts, and rate limits

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use mcp_rbac_gateway::config::Config;
use mcp_rbac_gateway::gateway::{Gateway, Reply, build_registry};
use mcp_rbac_gateway::middleware::{AuditSink, MemoryAuditSink, Method, Response};
use mcp_rbac_gateway::registry::{
    HandlerError, ToolDescriptor, ToolInvocation, ToolRegistry, handler_fn,
};

const CONFIG: &str = r"
server:
  request_timeout: 200ms
auth:
  users:
    - { token: employee-token, id: employee_1, name: Alice, role: employee }
    - { token: manager-token, id: manager_1, name: Bob, role: manager }
    - { token: md-token, id: md_1, name: Carol, role: md }
    - { token: limited-token, id: limited_1, role: employee, rate_limit: 2 }
roles:
  md: [manager]
  manager: [employee]
  employee: []
tools:
  toolsets: [leave, expense]
";

fn config() -> Config {
    let config: Config = serde_yaml::from_str(CONFIG).unwrap();
    config.validate().unwrap();
    config
}

fn gateway() -> (Gateway, Arc<MemoryAuditSink>) {
    let config = config();
    let registry = build_registry(&config.tools).unwrap();
    gateway_with(config, registry)
}

fn gateway_with(config: Config, registry: ToolRegistry) -> (Gateway, Arc<MemoryAuditSink>) {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit: Arc<dyn AuditSink> = sink.clone();
    (Gateway::with_registry(config, registry, audit).unwrap(), sink)
}

/// Send one JSON-RPC message and return the decoded response body
async fn send(gateway: &Gateway, token: Option<&str>, message: Value) -> Value {
    let header = token.map(|t| format!("Bearer {t}"));
    let body = serde_json::to_vec(&message).unwrap();
    match gateway
        .dispatcher()
        .handle_message(header.as_deref(), &body)
        .await
    {
        Reply::Message(response) => serde_json::to_value(response).unwrap(),
        other => panic!("expected a JSON-RPC message, got {other:?}"),
    }
}

async fn list_tools(gateway: &Gateway, token: &str) -> Vec<String> {
    let response = send(
        gateway,
        Some(token),
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
    )
    .await;
    response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

async fn call_tool(gateway: &Gateway, token: &str, name: &str, arguments: Value) -> Value {
    send(
        gateway,
        Some(token),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": name, "arguments": arguments}
        }),
    )
    .await
}

#[tokio::test]
async fn test_employee_sees_only_employee_tools() {
    let (gateway, _) = gateway();
    assert_eq!(
        list_tools(&gateway, "employee-token").await,
        vec!["apply_leave", "submit_expense_report"]
    );
}

#[tokio::test]
async fn test_hierarchy_widens_visibility() {
    let (gateway, _) = gateway();
    assert_eq!(
        list_tools(&gateway, "manager-token").await,
        vec![
            "apply_leave",
            "approve_leave",
            "submit_expense_report",
            "approve_expense_report"
        ]
    );
    assert_eq!(list_tools(&gateway, "md-token").await.len(), 5);
}

#[tokio::test]
async fn test_denied_call_is_indistinguishable_from_unknown_tool() {
    let (gateway, audit) = gateway();

    let denied = call_tool(
        &gateway,
        "employee-token",
        "approve_leave",
        json!({"request_id": "LR-1"}),
    )
    .await;
    let unknown = call_tool(&gateway, "employee-token", "no_such_tool", json!({})).await;

    assert_eq!(denied["error"]["code"], -32602);
    assert_eq!(denied["error"]["message"], "Unknown tool: approve_leave");
    assert_eq!(unknown["error"]["code"], -32602);
    assert_eq!(unknown["error"]["message"], "Unknown tool: no_such_tool");

    // The audit trail still records the real outcome
    let outcomes: Vec<_> = audit.events().iter().map(|e| e.outcome).collect();
    assert_eq!(outcomes, vec!["denied", "not_found"]);
    assert_eq!(gateway.stats().outcome_count("denied"), 1);
}

#[tokio::test]
async fn test_manager_can_approve_leave() {
    let (gateway, audit) = gateway();
    let response = call_tool(
        &gateway,
        "manager-token",
        "approve_leave",
        json!({"request_id": "LR-42"}),
    )
    .await;

    assert_eq!(response["result"]["isError"], false);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Leave request LR-42 approved"
    );

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].principal.as_deref(), Some("manager_1"));
    assert_eq!(events[0].tool.as_deref(), Some("approve_leave"));
    assert_eq!(events[0].outcome, "ok");
}

#[tokio::test]
async fn test_structured_result_from_md_tool() {
    let (gateway, _) = gateway();
    let response = call_tool(&gateway, "md-token", "get_company_financials", json!({})).await;
    assert_eq!(
        response["result"]["structuredContent"]["quarter"],
        "Q4 2024"
    );
}

#[tokio::test]
async fn test_disabled_tool_hides_existence_from_unauthorized_callers() {
    let (gateway, _) = gateway();
    gateway
        .dispatcher()
        .registry()
        .set_enabled("approve_leave", false)
        .unwrap();

    let manager = call_tool(
        &gateway,
        "manager-token",
        "approve_leave",
        json!({"request_id": "LR-1"}),
    )
    .await;
    assert_eq!(manager["error"]["code"], -32003);

    let employee = call_tool(
        &gateway,
        "employee-token",
        "approve_leave",
        json!({"request_id": "LR-1"}),
    )
    .await;
    assert_eq!(employee["error"]["code"], -32602);
    assert_eq!(employee["error"]["message"], "Unknown tool: approve_leave");

    assert!(
        !list_tools(&gateway, "manager-token")
            .await
            .contains(&"approve_leave".to_string())
    );

    gateway
        .dispatcher()
        .registry()
        .set_enabled("approve_leave", true)
        .unwrap();
    let again = call_tool(
        &gateway,
        "manager-token",
        "approve_leave",
        json!({"request_id": "LR-1"}),
    )
    .await;
    assert!(again.get("result").is_some());
}

#[tokio::test]
async fn test_bad_credentials_rejected_before_chain() {
    let (gateway, audit) = gateway();
    let body = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;

    for header in [None, Some("Bearer nope"), Some("Basic abc")] {
        let reply = gateway.dispatcher().handle_message(header, body).await;
        let Reply::Unauthorized(response) = reply else {
            panic!("expected 401 for {header:?}");
        };
        assert_eq!(response.error.unwrap().code, -32001);
    }

    // Nothing entered the chain
    assert_eq!(gateway.stats().snapshot().requests, 0);
    let events = audit.events();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.outcome == "unauthenticated"));
}

#[tokio::test]
async fn test_employee_applies_leave() {
    let (gateway, audit) = gateway();
    let response = call_tool(
        &gateway,
        "employee-token",
        "apply_leave",
        json!({"employee_id": "E1", "reason": "sick"}),
    )
    .await;

    assert_eq!(response["result"]["isError"], false);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Leave applied for E1 due to sick"
    );
    assert_eq!(audit.events()[0].principal.as_deref(), Some("employee_1"));
}

#[tokio::test]
async fn test_public_tool_listed_and_callable_for_every_role() {
    let config = config();
    let mut registry = build_registry(&config.tools).unwrap();
    registry
        .register(
            ToolDescriptor::builder("company_holidays")
                .description("Lists public holidays.")
                .handler(handler_fn(|_| async {
                    Ok::<_, HandlerError>(json!("New Year, Midsummer"))
                })),
        )
        .unwrap();
    let (gateway, _) = gateway_with(config, registry);

    for token in ["employee-token", "manager-token", "md-token"] {
        assert!(
            list_tools(&gateway, token)
                .await
                .contains(&"company_holidays".to_string()),
            "{token} should see the public tool"
        );
        let response = call_tool(&gateway, token, "company_holidays", json!({})).await;
        assert_eq!(
            response["result"]["content"][0]["text"],
            "New Year, Midsummer",
            "{token}"
        );
    }
}

#[tokio::test]
async fn test_decoded_request_runs_through_handle() {
    let (gateway, _) = gateway();
    let dispatcher = gateway.dispatcher();

    let response = dispatcher
        .handle(Some("Bearer manager-token"), Method::ListTools)
        .await
        .unwrap();
    let Response::Tools(tools) = response else {
        panic!("expected a tool list");
    };
    assert_eq!(tools.len(), 4);

    let err = dispatcher
        .handle(Some("Bearer nope"), Method::Ping)
        .await
        .unwrap_err();
    assert_eq!(err.outcome(), "unauthenticated");
}

#[tokio::test]
async fn test_every_listed_tool_is_callable_and_no_other() {
    let (gateway, _) = gateway();
    let all: Vec<String> = gateway
        .dispatcher()
        .registry()
        .list()
        .iter()
        .map(|t| t.name().to_string())
        .collect();

    for token in ["employee-token", "manager-token", "md-token"] {
        let visible = list_tools(&gateway, token).await;
        for name in &all {
            // Empty arguments: an authorized call fails argument checks
            // (-32602 "Invalid arguments"), a denied one reports an unknown tool.
            let response = call_tool(&gateway, token, name, json!({})).await;
            let hidden = response["error"]["message"] == format!("Unknown tool: {name}");
            assert_eq!(
                hidden,
                !visible.contains(name),
                "{token} / {name}: {response}"
            );
        }
    }
}

#[tokio::test]
async fn test_unknown_arguments_rejected_in_strict_mode() {
    let (gateway, _) = gateway();
    let response = call_tool(
        &gateway,
        "employee-token",
        "apply_leave",
        json!({"employee_id": "E1", "reason": "rest", "priority": "high"}),
    )
    .await;
    assert_eq!(response["error"]["code"], -32602);
    assert!(
        response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("priority")
    );
}

fn failing_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDescriptor::builder("explode")
                .roles(["employee"])
                .handler(handler_fn(|inv: ToolInvocation| async move {
                    if inv.arguments.is_empty() {
                        panic!("handler bug");
                    }
                    Ok::<_, HandlerError>(json!("unreachable"))
                })),
        )
        .unwrap();
    registry
        .register(
            ToolDescriptor::builder("fail")
                .roles(["employee"])
                .handler(handler_fn(|_| async {
                    Err::<Value, HandlerError>("database password rejected".into())
                })),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_error() {
    let (gateway, audit) = gateway_with(config(), failing_registry());
    let response = call_tool(&gateway, "employee-token", "explode", json!({})).await;

    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "Internal error");
    assert_eq!(audit.events()[0].outcome, "middleware_failure");

    // The gateway keeps serving
    let next = call_tool(&gateway, "employee-token", "fail", json!({})).await;
    assert!(next.get("result").is_some());
}

#[tokio::test]
async fn test_tool_error_details_are_masked() {
    let (gateway, _) = gateway_with(config(), failing_registry());
    let response = call_tool(&gateway, "employee-token", "fail", json!({})).await;

    assert_eq!(response["result"]["isError"], true);
    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error calling tool 'fail'"
    );
}

#[tokio::test]
async fn test_tool_error_details_shown_when_unmasked() {
    let mut config = config();
    config.tools.mask_error_details = false;
    let (gateway, _) = gateway_with(config, failing_registry());
    let response = call_tool(&gateway, "employee-token", "fail", json!({})).await;

    assert_eq!(
        response["result"]["content"][0]["text"],
        "Error calling tool 'fail': database password rejected"
    );
}

#[tokio::test]
async fn test_timeout_cancels_the_request() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&cancelled);

    let mut registry = ToolRegistry::new();
    registry
        .register(
            ToolDescriptor::builder("slow")
                .roles(["employee"])
                .handler(handler_fn(move |inv| {
                    let seen = Arc::clone(&seen);
                    async move {
                        tokio::select! {
                            () = inv.cancel.cancelled() => seen.store(true, Ordering::SeqCst),
                            () = tokio::time::sleep(Duration::from_secs(10)) => {}
                        }
                        Ok::<_, HandlerError>(json!("finished"))
                    }
                })),
        )
        .unwrap();

    let (gateway, _) = gateway_with(config(), registry);
    let response = call_tool(&gateway, "employee-token", "slow", json!({})).await;
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["message"], "Request timed out");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cancelled.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_rate_limit_per_principal() {
    let (gateway, _) = gateway();
    for _ in 0..2 {
        assert_eq!(list_tools(&gateway, "limited-token").await.len(), 2);
    }
    let limited = send(
        &gateway,
        Some("limited-token"),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
    )
    .await;
    assert_eq!(limited["error"]["code"], -32005);

    // Other principals are unaffected
    assert_eq!(list_tools(&gateway, "employee-token").await.len(), 2);
}

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let (gateway, _) = gateway();
    let response = send(
        &gateway,
        Some("employee-token"),
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05"}
        }),
    )
    .await;
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert!(response["result"]["capabilities"]["tools"].is_object());
}
