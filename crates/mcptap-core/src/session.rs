//! Session lifecycle - tracked conversations and their registry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Default message dialect for new sessions
pub const DEFAULT_PROTOCOL: &str = "mcp";

/// Opaque capability map learned during negotiation
pub type Capabilities = serde_json::Map<String, serde_json::Value>;

/// How to reach the observed endpoint
///
/// Closed set of transports; each variant carries its required fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Child process speaking over stdin/stdout
    Stdio {
        command: String,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,

        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },

    /// Remote endpoint over HTTP
    Http { url: String },
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Stdio { .. } => "stdio",
            TransportConfig::Http { .. } => "http",
        }
    }
}

/// Endpoint description attached to a session, immutable once attached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,

    #[serde(flatten)]
    pub transport: TransportConfig,
}

impl ServerConfig {
    /// Config for a stdio endpoint
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stdio {
                command: command.into(),
                args: Vec::new(),
                env: HashMap::new(),
            },
        }
    }

    /// Config for an HTTP endpoint
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Http { url: url.into() },
        }
    }

    /// Check the config contract, collecting every violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push(ConfigViolation {
                field: "name".to_string(),
                problem: "must not be empty".to_string(),
            });
        }

        match &self.transport {
            TransportConfig::Stdio { command, .. } => {
                if command.trim().is_empty() {
                    violations.push(ConfigViolation {
                        field: "command".to_string(),
                        problem: "required for stdio transport".to_string(),
                    });
                }
            }
            TransportConfig::Http { url } => {
                if url.trim().is_empty() {
                    violations.push(ConfigViolation {
                        field: "url".to_string(),
                        problem: "required for http transport".to_string(),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

/// One field-level problem found while validating a config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub field: String,
    pub problem: String,
}

fn describe(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.problem))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Rejected server config, with every violated field listed
#[derive(Debug, Error)]
#[error("invalid server config: {}", describe(.violations))]
pub struct ValidationError {
    pub violations: Vec<ConfigViolation>,
}

/// Session lifecycle state
///
/// `Closed` and `Error` are terminal in practice; the registry records
/// requested states without checking transition legality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Initializing,
    Active,
    Closed,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Closed => "closed",
            SessionState::Error => "error",
        }
    }

    /// Whether sessions in this state are hidden from `list`
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

/// One tracked conversation between a client and an endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (ULID)
    pub id: String,

    pub state: SessionState,

    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation; always `>= created_at`
    pub updated_at: DateTime<Utc>,

    pub config: ServerConfig,

    /// Message dialect tag
    pub protocol: String,

    /// Learned during negotiation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_capabilities: Option<Capabilities>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_capabilities: Option<Capabilities>,
}

impl Session {
    /// Create a new session in `Created` state
    pub fn new(config: ServerConfig) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string(),
            state: SessionState::Created,
            created_at: now,
            updated_at: now,
            config,
            protocol: DEFAULT_PROTOCOL.to_string(),
            protocol_version: None,
            client_capabilities: None,
            server_capabilities: None,
        }
    }

    /// Bump `updated_at`, strictly past its previous value even when
    /// the clock has not visibly advanced
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }
}

/// Owns the set of tracked sessions; no I/O, no locking
///
/// Shared-state callers wrap the registry in their own synchronization
/// (the stock interceptors use `Arc<tokio::sync::RwLock<_>>`).
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config and create a session in `Created` state
    pub fn create(&mut self, config: ServerConfig) -> Result<Session, ValidationError> {
        config.validate()?;
        let session = Session::new(config);
        info!(
            session_id = %session.id,
            server = %session.config.name,
            transport = session.config.transport.kind(),
            "session created"
        );
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Live sessions only; order is unspecified
    pub fn list(&self) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .collect()
    }

    /// Every session regardless of state
    pub fn list_all(&self) -> Vec<&Session> {
        self.sessions.values().collect()
    }

    /// Mark a session closed; unknown ids are ignored
    pub fn close(&mut self, id: &str) {
        self.update_state(id, SessionState::Closed);
    }

    /// Record the requested state unconditionally; unknown ids are
    /// ignored. Transition legality is the caller's discipline.
    pub fn update_state(&mut self, id: &str, state: SessionState) {
        if let Some(session) = self.sessions.get_mut(id) {
            debug!(
                session_id = %id,
                from = session.state.as_str(),
                to = state.as_str(),
                "session state change"
            );
            session.state = state;
            session.touch();
        }
    }

    /// Overwrite the supplied capability sides; unknown ids are ignored
    pub fn update_capabilities(
        &mut self,
        id: &str,
        client: Option<Capabilities>,
        server: Option<Capabilities>,
    ) {
        if let Some(session) = self.sessions.get_mut(id) {
            if let Some(client) = client {
                session.client_capabilities = Some(client);
            }
            if let Some(server) = server {
                session.server_capabilities = Some(server);
            }
            session.touch();
        }
    }

    /// Record the negotiated protocol version; unknown ids are ignored
    pub fn set_protocol_version(&mut self, id: &str, version: impl Into<String>) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.protocol_version = Some(version.into());
            session.touch();
        }
    }

    /// Remove the session entirely, returning whether it existed
    pub fn delete(&mut self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    /// Total sessions, including closed and errored ones
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_config() -> ServerConfig {
        ServerConfig::stdio("srv", "node")
    }

    #[test]
    fn test_create_rejects_empty_name() {
        let mut registry = SessionRegistry::new();
        let err = registry
            .create(ServerConfig::stdio("", "node"))
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "name");
    }

    #[test]
    fn test_create_rejects_missing_transport_fields() {
        let mut registry = SessionRegistry::new();

        let err = registry.create(ServerConfig::stdio("srv", "")).unwrap_err();
        assert_eq!(err.violations[0].field, "command");

        let err = registry.create(ServerConfig::http("", "")).unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "url"]);
    }

    #[test]
    fn test_create_starts_in_created_state() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(valid_config()).unwrap();
        assert_eq!(session.state, SessionState::Created);
        assert!(session.updated_at >= session.created_at);
        assert_eq!(session.protocol, "mcp");
    }

    #[test]
    fn test_create_allocates_unique_ids() {
        let mut registry = SessionRegistry::new();
        let a = registry.create(valid_config()).unwrap();
        let b = registry.create(valid_config()).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_updated_at_strictly_increases() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(valid_config()).unwrap();

        let before = registry.get(&session.id).unwrap().updated_at;
        registry.update_state(&session.id, SessionState::Active);
        let after = registry.get(&session.id).unwrap().updated_at;
        assert!(after > before);

        // Back-to-back mutations still move forward
        registry.update_state(&session.id, SessionState::Active);
        let again = registry.get(&session.id).unwrap().updated_at;
        assert!(again > after);
    }

    #[test]
    fn test_list_excludes_terminal_sessions() {
        let mut registry = SessionRegistry::new();
        let live = registry.create(valid_config()).unwrap();
        let closed = registry.create(valid_config()).unwrap();
        let errored = registry.create(valid_config()).unwrap();

        registry.close(&closed.id);
        registry.update_state(&errored.id, SessionState::Error);

        let listed: Vec<&str> = registry.list().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(listed, vec![live.id.as_str()]);
        assert_eq!(registry.list_all().len(), 3);
    }

    #[test]
    fn test_close_is_noop_for_unknown_id() {
        let mut registry = SessionRegistry::new();
        registry.close("no-such-session");
        registry.update_state("no-such-session", SessionState::Active);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_update_capabilities_overwrites_supplied_sides_only() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(valid_config()).unwrap();

        let client: Capabilities = json!({"sampling": {}}).as_object().unwrap().clone();
        registry.update_capabilities(&session.id, Some(client.clone()), None);

        let server: Capabilities = json!({"tools": {"listChanged": true}})
            .as_object()
            .unwrap()
            .clone();
        registry.update_capabilities(&session.id, None, Some(server.clone()));

        let stored = registry.get(&session.id).unwrap();
        assert_eq!(stored.client_capabilities, Some(client));
        assert_eq!(stored.server_capabilities, Some(server));
    }

    #[test]
    fn test_delete_reports_existence() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(valid_config()).unwrap();
        assert!(registry.delete(&session.id));
        assert!(!registry.delete(&session.id));
        assert!(registry.get(&session.id).is_none());
    }

    #[test]
    fn test_close_only_changes_state() {
        let mut registry = SessionRegistry::new();
        let session = registry.create(valid_config()).unwrap();
        registry.close(&session.id);

        let stored = registry.get(&session.id).unwrap();
        assert_eq!(stored.state, SessionState::Closed);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_server_config_wire_shape() {
        let json = serde_json::to_value(ServerConfig::stdio("srv", "node")).unwrap();
        assert_eq!(json["transport"], "stdio");
        assert_eq!(json["command"], "node");

        let parsed: ServerConfig = serde_json::from_value(
            json!({"name": "remote", "transport": "http", "url": "http://localhost:3000/mcp"}),
        )
        .unwrap();
        assert_eq!(parsed.transport.kind(), "http");
    }
}
