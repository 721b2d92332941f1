//! Built-in toolsets
//!
//! Each toolset is a named group of tool descriptors that configuration can
//! switch on with `tools.toolsets`.

mod expense;
mod leave;

use crate::registry::ToolDescriptor;
use crate::{Error, Result};

/// Names accepted in `tools.toolsets`
pub const TOOLSETS: &[&str] = &["leave", "expense"];

/// Descriptors of one toolset, in registration order
///
/// # Errors
///
/// Returns `Error::Config` for an unknown toolset name.
pub fn toolset(name: &str) -> Result<Vec<ToolDescriptor>> {
    match name {
        "leave" => Ok(leave::tools()),
        "expense" => Ok(expense::tools()),
        other => Err(Error::Config(format!(
            "Unknown toolset '{other}' (known: {})",
            TOOLSETS.join(", ")
        ))),
    }
}
