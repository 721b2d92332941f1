//! MCP protocol types (tools subset)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// Preferred MCP protocol version
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Versions accepted during `initialize`, newest first
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the version to answer `initialize` with: the client's if supported,
/// otherwise ours.
#[must_use]
pub fn negotiate_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|r| SUPPORTED_VERSIONS.iter().copied().find(|v| *v == r))
        .unwrap_or(PROTOCOL_VERSION)
}
