//! Leave management tools.

use serde_json::json;

use crate::registry::{HandlerError, HandlerResult, ToolDescriptor, ToolInvocation, handler_fn};

fn required<'a>(inv: &'a ToolInvocation, name: &str) -> Result<&'a str, HandlerError> {
    inv.str_arg(name)
        .ok_or_else(|| format!("'{name}' must be a string").into())
}

async fn apply_leave(inv: ToolInvocation) -> HandlerResult {
    let employee_id = required(&inv, "employee_id")?;
    let reason = required(&inv, "reason")?;
    Ok(json!(format!("Leave applied for {employee_id} due to {reason}")))
}

async fn approve_leave(inv: ToolInvocation) -> HandlerResult {
    let request_id = required(&inv, "request_id")?;
    Ok(json!(format!("Leave request {request_id} approved")))
}

pub(super) fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::builder("apply_leave")
            .description("Applies for a leave of absence.")
            .param("employee_id", "string", "Employee applying for leave")
            .param("reason", "string", "Reason for the leave")
            .roles(["employee", "manager"])
            .handler(handler_fn(apply_leave)),
        ToolDescriptor::builder("approve_leave")
            .description("Approves a pending leave request.")
            .param("request_id", "string", "Leave request to approve")
            .roles(["manager"])
            .handler(handler_fn(approve_leave)),
    ]
}
