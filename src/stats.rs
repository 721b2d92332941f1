//! Request statistics for the admin API
//!
//! Counts requests per outcome and calls per tool. Kept independent of the
//! `metrics` feature so `/admin/stats` works without an exporter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Per-tool counters
#[derive(Default)]
struct ToolCounters {
    calls: AtomicU64,
    denied: AtomicU64,
    failed: AtomicU64,
}

/// Live counters shared by the timing unit and the admin API
#[derive(Default)]
pub struct GatewayStats {
    requests: AtomicU64,
    outcomes: DashMap<&'static str, AtomicU64>,
    tools: DashMap<String, ToolCounters>,
}

impl GatewayStats {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request
    pub fn record(&self, tool: Option<&str>, outcome: &'static str) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.outcomes
            .entry(outcome)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);

        if let Some(tool) = tool {
            let counters = self.tools.entry(tool.to_string()).or_default();
            counters.calls.fetch_add(1, Ordering::Relaxed);
            match outcome {
                "denied" | "not_found" => {
                    counters.denied.fetch_add(1, Ordering::Relaxed);
                }
                "tool_error" | "middleware_failure" | "error" => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    /// Requests seen so far with the given outcome
    #[must_use]
    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.outcomes
            .get(outcome)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Snapshot of current counters. Tools are sorted by call count, then name.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let outcomes = self
            .outcomes
            .iter()
            .map(|e| ((*e.key()).to_string(), e.value().load(Ordering::Relaxed)))
            .collect();

        let mut tools: Vec<ToolStats> = self
            .tools
            .iter()
            .map(|e| ToolStats {
                tool: e.key().clone(),
                calls: e.calls.load(Ordering::Relaxed),
                denied: e.denied.load(Ordering::Relaxed),
                failed: e.failed.load(Ordering::Relaxed),
            })
            .collect();
        tools.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.tool.cmp(&b.tool)));

        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            outcomes,
            tools,
        }
    }
}

/// Serializable counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Requests that entered the chain
    pub requests: u64,
    /// Count per outcome label
    pub outcomes: BTreeMap<String, u64>,
    /// Per-tool call counts
    pub tools: Vec<ToolStats>,
}

/// Counters for one tool name (including names that do not exist)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStats {
    /// Requested tool name
    pub tool: String,
    /// Calls attempted
    pub calls: u64,
    /// Calls refused as unknown or unauthorized
    pub denied: u64,
    /// Calls that failed during execution
    pub failed: u64,
}
