//! Expense and finance tools.

use serde_json::{Value, json};

use crate::registry::{HandlerResult, ToolDescriptor, ToolInvocation, handler_fn};

async fn submit_expense_report(inv: ToolInvocation) -> HandlerResult {
    let amount = inv
        .arguments
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or("'amount' must be a number")?;
    let description = inv
        .str_arg("description")
        .ok_or("'description' must be a string")?;
    Ok(json!(format!(
        "Expense report for {amount:.2} ('{description}') submitted successfully."
    )))
}

async fn approve_expense_report(inv: ToolInvocation) -> HandlerResult {
    let report_id = inv
        .arguments
        .get("report_id")
        .and_then(Value::as_i64)
        .ok_or("'report_id' must be an integer")?;
    let notes = inv.str_arg("approver_notes").unwrap_or_default();
    Ok(json!({
        "status": "approved",
        "report_id": report_id,
        "approved_by": inv.principal.name,
        "notes": notes,
    }))
}

async fn get_company_financials(_inv: ToolInvocation) -> HandlerResult {
    Ok(json!({
        "revenue": "10.5M USD",
        "profit": "2.1M USD",
        "quarter": "Q4 2024",
    }))
}

pub(super) fn tools() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::builder("submit_expense_report")
            .description("Submits an expense report for the current user.")
            .param("amount", "number", "Amount to reimburse")
            .param("description", "string", "What the expense was for")
            .roles(["employee"])
            .handler(handler_fn(submit_expense_report)),
        ToolDescriptor::builder("approve_expense_report")
            .description("Approves an expense report submitted by a direct report.")
            .param("report_id", "integer", "Report to approve")
            .param("approver_notes", "string", "Notes recorded with the approval")
            .roles(["manager"])
            .handler(handler_fn(approve_expense_report)),
        ToolDescriptor::builder("get_company_financials")
            .description("[CONFIDENTIAL] Retrieves the company's quarterly financial summary.")
            .roles(["md"])
            .handler(handler_fn(get_company_financials)),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::gateway::auth::Principal;

    fn invocation(args: Value, principal: Principal) -> ToolInvocation {
        ToolInvocation {
            tool: "t".to_string(),
            arguments: args.as_object().cloned().unwrap_or_else(Map::new),
            principal,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn submit_formats_amount() {
        let out = submit_expense_report(invocation(
            json!({"amount": 42.5, "description": "Taxi"}),
            Principal::new("employee_1", "Alice", "employee"),
        ))
        .await
        .unwrap();
        assert_eq!(
            out,
            json!("Expense report for 42.50 ('Taxi') submitted successfully.")
        );
    }

    #[tokio::test]
    async fn approval_records_approver() {
        let out = approve_expense_report(invocation(
            json!({"report_id": 9, "approver_notes": "ok"}),
            Principal::new("manager_1", "Bob", "manager"),
        ))
        .await
        .unwrap();
        assert_eq!(out["approved_by"], "Bob");
        assert_eq!(out["report_id"], 9);
    }

    #[tokio::test]
    async fn bad_amount_is_a_handler_error() {
        let err = submit_expense_report(invocation(
            json!({"amount": "lots", "description": "Taxi"}),
            Principal::new("employee_1", "Alice", "employee"),
        ))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("amount"));
    }
}
