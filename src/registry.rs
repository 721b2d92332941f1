//! Tool registry
//!
//! Tools are registered at startup while the registry is still exclusively
//! owned; afterwards it is shared behind an `Arc` and only the `enabled`
//! flag of a descriptor can change.
//!
//! `enabled` is read without locking. A request that looked a tool up just
//! before [`ToolRegistry::set_enabled`] may still see the old value; writers
//! are serialized, readers are eventually consistent.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::auth::Principal;
use crate::rbac::Role;
use crate::{Error, Result};

/// Error type returned by tool handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by tool handlers
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Everything a handler receives for one call
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Tool name
    pub tool: String,
    /// Arguments, already checked against the tool's schema
    pub arguments: Map<String, Value>,
    /// Caller identity
    pub principal: Principal,
    /// Cancelled when the caller goes away. Handlers may ignore it.
    pub cancel: CancellationToken,
}

impl ToolInvocation {
    /// String argument by name
    #[must_use]
    pub fn str_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }
}

/// Business logic behind a tool.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    /// Execute the tool
    async fn call(&self, invocation: ToolInvocation) -> HandlerResult;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, invocation: ToolInvocation) -> HandlerResult {
        (self.0)(invocation).await
    }
}

/// Wrap an async closure as a shareable handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// What to do with arguments the schema does not declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentPolicy {
    /// Reject the call with `InvalidArguments`
    #[default]
    Strict,
    /// Drop undeclared arguments before invocation
    Lenient,
}

/// Registered metadata and handler for one callable tool
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    required_roles: BTreeSet<Role>,
    enabled: AtomicBool,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("required_roles", &self.required_roles)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    /// Start describing a tool
    pub fn builder(name: impl Into<String>) -> ToolDescriptorBuilder {
        ToolDescriptorBuilder {
            name: name.into(),
            description: String::new(),
            properties: Map::new(),
            required: Vec::new(),
            schema: None,
            required_roles: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Unique tool name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON Schema of the arguments object
    #[must_use]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Roles allowed to use the tool; empty means public
    #[must_use]
    pub fn required_roles(&self) -> &BTreeSet<Role> {
        &self.required_roles
    }

    /// Whether the tool requires no role
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.required_roles.is_empty()
    }

    /// Current enabled flag (may be stale by the time it is acted on)
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Handler reference
    #[must_use]
    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }

    /// Replace the required roles. Only possible before registration.
    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Set the initial enabled flag. Only possible before registration.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        *self.enabled.get_mut() = enabled;
        self
    }

    /// Check `arguments` against the declared schema.
    ///
    /// Only the top-level shape is checked: declared property names and the
    /// `required` list. Undeclared keys are rejected or dropped according to
    /// `policy`.
    pub fn check_arguments(
        &self,
        mut arguments: Map<String, Value>,
        policy: ArgumentPolicy,
    ) -> Result<Map<String, Value>> {
        let empty = Map::new();
        let properties = self
            .input_schema
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let unknown: Vec<String> = arguments
            .keys()
            .filter(|k| !properties.contains_key(*k))
            .cloned()
            .collect();

        if !unknown.is_empty() {
            match policy {
                ArgumentPolicy::Strict => {
                    return Err(Error::InvalidArguments {
                        tool: self.name.clone(),
                        reason: format!("unknown argument(s): {}", unknown.join(", ")),
                    });
                }
                ArgumentPolicy::Lenient => {
                    debug!(tool = %self.name, dropped = ?unknown, "Dropping undeclared arguments");
                    for key in &unknown {
                        arguments.remove(key);
                    }
                }
            }
        }

        let missing: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|r| !arguments.contains_key(*r))
            .collect();
        if !missing.is_empty() {
            return Err(Error::InvalidArguments {
                tool: self.name.clone(),
                reason: format!("missing required argument(s): {}", missing.join(", ")),
            });
        }

        Ok(arguments)
    }
}

/// Builder for [`ToolDescriptor`]
pub struct ToolDescriptorBuilder {
    name: String,
    description: String,
    properties: Map<String, Value>,
    required: Vec<String>,
    schema: Option<Value>,
    required_roles: BTreeSet<Role>,
    enabled: bool,
}

impl ToolDescriptorBuilder {
    /// Set the description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a required parameter of the given JSON type
    #[must_use]
    pub fn param(mut self, name: &str, json_type: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": json_type, "description": description }),
        );
        self.required.push(name.to_string());
        self
    }

    /// Declare an optional parameter of the given JSON type
    #[must_use]
    pub fn optional_param(mut self, name: &str, json_type: &str, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            json!({ "type": json_type, "description": description }),
        );
        self
    }

    /// Use a complete JSON Schema instead of `param` declarations
    #[must_use]
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Roles allowed to use the tool
    #[must_use]
    pub fn roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Initial enabled flag
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Attach the handler and finish
    pub fn handler(self, handler: Arc<dyn ToolHandler>) -> ToolDescriptor {
        let input_schema = self.schema.unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            })
        });
        ToolDescriptor {
            name: self.name,
            description: self.description,
            input_schema,
            required_roles: self.required_roles,
            enabled: AtomicBool::new(self.enabled),
            handler,
        }
    }
}

/// Registry of tools, keyed by unique name, iterated in registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<ToolDescriptor>>,
    index: HashMap<String, usize>,
    admin: Mutex<()>,
}

impl ToolRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateTool` if the name is already taken.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<Arc<ToolDescriptor>> {
        if self.index.contains_key(descriptor.name()) {
            return Err(Error::DuplicateTool(descriptor.name().to_string()));
        }
        let descriptor = Arc::new(descriptor);
        self.index
            .insert(descriptor.name().to_string(), self.tools.len());
        self.tools.push(Arc::clone(&descriptor));
        debug!(
            tool = %descriptor.name(),
            roles = ?descriptor.required_roles(),
            "Registered tool"
        );
        Ok(descriptor)
    }

    /// Register a tool from its parts
    pub fn register_tool<I, R>(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
        schema: Value,
        required_roles: I,
    ) -> Result<Arc<ToolDescriptor>>
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        let name = name.into();
        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.register(
            ToolDescriptor::builder(name)
                .description(description)
                .schema(schema)
                .roles(required_roles)
                .handler(handler),
        )
    }

    /// Look up a tool.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolNotFound` if no tool has this name.
    pub fn get(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.tools[i]))
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// All tools in registration order
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.clone()
    }

    /// Toggle a tool's enabled flag. Returns the previous value.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolNotFound` if no tool has this name.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let descriptor = self.get(name)?;
        let _guard = self.admin.lock();
        let previous = descriptor.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(tool = %name, enabled, "Tool enabled flag changed");
        }
        Ok(previous)
    }

    /// Number of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
