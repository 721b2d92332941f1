//! Configuration management

use std::{
    collections::{BTreeMap, HashSet},
    env,
    path::Path,
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::rbac::{Role, RoleHierarchy};
use crate::registry::ArgumentPolicy;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Credential lookup table
    pub auth: AuthConfig,
    /// Role hierarchy as direct edges: role -> roles it subsumes
    pub roles: BTreeMap<String, Vec<String>>,
    /// Middleware chain configuration
    pub gateway: ChainConfig,
    /// Tool catalogue configuration
    pub tools: ToolsConfig,
    /// Administrative endpoints
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Static credential table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Known users, each bound to one bearer token and one role
    pub users: Vec<UserConfig>,
}

/// One entry of the credential table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Bearer token (supports `env:VAR_NAME`)
    pub token: String,
    /// Stable user identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Primary role
    pub role: String,
    /// Rate limit (requests per minute, 0 = unlimited)
    #[serde(default)]
    pub rate_limit: u32,
}

impl UserConfig {
    /// Resolve the token (expand `env:VAR_NAME`).
    ///
    /// `None` when the referenced variable is unset or empty; the literal
    /// `env:...` string is never usable as a credential.
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        resolve_secret(&self.token)
    }
}

/// Expand an `env:VAR_NAME` reference. Plain values pass through; blank
/// results are `None`.
fn resolve_secret(raw: &str) -> Option<String> {
    let value = match raw.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).ok()?,
        None => raw.to_string(),
    };
    (!value.trim().is_empty()).then_some(value)
}

/// Middleware units available to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareKind {
    /// Monotonic timing and request metrics
    Timing,
    /// Structured audit events
    Audit,
    /// Per-principal rate limiting
    RateLimit,
    /// Expand the principal's role into its permission set
    Roles,
    /// Gate `tools/call` and filter `tools/list`
    Authorization,
}

impl MiddlewareKind {
    /// Configuration name of the unit
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timing => "timing",
            Self::Audit => "audit",
            Self::RateLimit => "rate_limit",
            Self::Roles => "roles",
            Self::Authorization => "authorization",
        }
    }
}

/// Middleware chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Units in execution order (outermost first)
    pub middleware: Vec<MiddlewareKind>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            middleware: vec![
                MiddlewareKind::Timing,
                MiddlewareKind::Audit,
                MiddlewareKind::RateLimit,
                MiddlewareKind::Roles,
                MiddlewareKind::Authorization,
            ],
        }
    }
}

/// Tool catalogue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Built-in toolsets to register (`leave`, `expense`)
    pub toolsets: Vec<String>,
    /// Tools that start disabled
    pub disabled: Vec<String>,
    /// Handling of arguments the schema does not declare
    pub unknown_arguments: ArgumentPolicy,
    /// Hide handler error details from callers
    pub mask_error_details: bool,
    /// Replace the required roles of individual tools
    pub role_overrides: BTreeMap<String, Vec<String>>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            toolsets: vec!["leave".to_string()],
            disabled: Vec::new(),
            unknown_arguments: ArgumentPolicy::Strict,
            mask_error_details: true,
            role_overrides: BTreeMap::new(),
        }
    }
}

/// Administrative endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin bearer token. Supports a literal value, `env:VAR_NAME`, or
    /// `auto` (generates a random token). Admin routes are off when unset.
    pub token: Option<String>,
}

impl AdminConfig {
    /// Resolve the admin token (expand env vars, generate if `auto`).
    ///
    /// An `env:` reference to an unset variable resolves to `None`, which
    /// keeps the admin routes off.
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        let token = self.token.as_deref()?;
        if token == "auto" {
            use rand::RngExt;
            let random_bytes: [u8; 32] = rand::rng().random();
            Some(format!(
                "adm_{}",
                base64::Engine::encode(
                    &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                    random_bytes
                )
            ))
        } else {
            resolve_secret(token)
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (RBAC_GATEWAY_ prefix)
        figment = figment.merge(Env::prefixed("RBAC_GATEWAY_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();
        config.expand_env_vars()?;
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in credential values
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for user in &mut self.auth.users {
            user.token = Self::expand_string(&re, &user.token);
        }
        if let Some(token) = self.admin.token.as_mut() {
            *token = Self::expand_string(&re, token);
        }
        Ok(())
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Build the role hierarchy described by `roles`
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the hierarchy has a cycle.
    pub fn role_hierarchy(&self) -> Result<RoleHierarchy> {
        RoleHierarchy::from_edges(&self.roles)
    }

    /// Cross-section checks that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let hierarchy = self.role_hierarchy()?;

        let mut tokens = HashSet::new();
        let mut ids = HashSet::new();
        for user in &self.auth.users {
            if user.token.trim().is_empty() {
                return Err(Error::Config(format!("User '{}' has an empty token", user.id)));
            }
            let Some(token) = user.resolve_token() else {
                return Err(Error::Config(format!(
                    "User '{}' token references an unset environment variable ({})",
                    user.id, user.token
                )));
            };
            if !tokens.insert(token) {
                return Err(Error::Config(format!(
                    "User '{}' reuses another user's token",
                    user.id
                )));
            }
            if !ids.insert(user.id.as_str()) {
                return Err(Error::Config(format!("Duplicate user id '{}'", user.id)));
            }
            if !hierarchy.contains(&Role::new(user.role.as_str())) {
                return Err(Error::Config(format!(
                    "User '{}' has role '{}' which is not declared under `roles`",
                    user.id, user.role
                )));
            }
        }

        if let Some(token) = self.admin.token.as_deref() {
            if self.admin.resolve_token().is_none() {
                return Err(Error::Config(format!(
                    "Admin token references an unset environment variable ({token})"
                )));
            }
        }

        let mut seen = HashSet::new();
        for kind in &self.gateway.middleware {
            if !seen.insert(kind) {
                return Err(Error::Config(format!(
                    "Middleware '{}' listed more than once",
                    kind.as_str()
                )));
            }
        }

        for (tool, roles) in &self.tools.role_overrides {
            if let Some(unknown) = roles.iter().find(|r| !hierarchy.contains(&Role::new(r.as_str())))
            {
                return Err(Error::Config(format!(
                    "Role override for '{tool}' names unknown role '{unknown}'"
                )));
            }
        }

        Ok(())
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
server:
  port: 8001
  request_timeout: 500ms
auth:
  users:
    - token: employee-token
      id: employee_1
      name: Alice
      role: employee
    - token: manager-token
      id: manager_1
      name: Bob
      role: manager
      rate_limit: 60
roles:
  md: [manager]
  manager: [employee]
tools:
  toolsets: [leave, expense]
  unknown_arguments: lenient
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_sample_config() {
        let file = write_config(SAMPLE);
        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.server.port, 8001);
        assert_eq!(config.server.request_timeout, Duration::from_millis(500));
        assert_eq!(config.auth.users.len(), 2);
        assert_eq!(config.auth.users[1].rate_limit, 60);
        assert_eq!(config.tools.unknown_arguments, ArgumentPolicy::Lenient);
        assert!(config.tools.mask_error_details);
        assert_eq!(config.gateway.middleware.len(), 5);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Some(Path::new("/nonexistent/gateway.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_user_role_rejected() {
        let yaml = r"
auth:
  users:
    - token: t1
      id: u1
      role: intern
roles:
  manager: [employee]
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("intern"));
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let yaml = r"
auth:
  users:
    - { token: same, id: a, role: employee }
    - { token: same, id: b, role: employee }
roles:
  employee: []
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_role_cycle_rejected() {
        let yaml = r"
roles:
  manager: [employee]
  employee: [manager]
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_middleware_rejected() {
        let yaml = r"
gateway:
  middleware: [timing, roles, timing, authorization]
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_token_resolution() {
        let auto = AdminConfig {
            token: Some("auto".to_string()),
        };
        assert!(auto.resolve_token().unwrap().starts_with("adm_"));

        let literal = AdminConfig {
            token: Some("letmein".to_string()),
        };
        assert_eq!(literal.resolve_token().as_deref(), Some("letmein"));
        assert!(AdminConfig::default().resolve_token().is_none());
    }

    #[test]
    fn test_unset_env_token_never_becomes_a_credential() {
        let user = UserConfig {
            token: "env:RBAC_GW_TEST_UNSET_USER_TOKEN".to_string(),
            id: "md_1".to_string(),
            name: String::new(),
            role: "md".to_string(),
            rate_limit: 0,
        };
        assert!(user.resolve_token().is_none());

        let config = Config {
            auth: AuthConfig { users: vec![user] },
            roles: BTreeMap::from([("md".to_string(), Vec::new())]),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RBAC_GW_TEST_UNSET_USER_TOKEN"));
    }

    #[test]
    fn test_unset_env_admin_token_rejected() {
        let admin = AdminConfig {
            token: Some("env:RBAC_GW_TEST_UNSET_ADMIN_TOKEN".to_string()),
        };
        assert!(admin.resolve_token().is_none());

        let config = Config {
            admin,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }

    #[test]
    fn test_expand_string_uses_default() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        let out = Config::expand_string(&re, "${RBAC_GW_TEST_SURELY_UNSET:-fallback}");
        assert_eq!(out, "fallback");
    }
}
