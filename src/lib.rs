//! Keycloak Graph Mapper
//!
//! Exports the configuration of Keycloak realms into a Neo4j property graph:
//! - Source client for the Keycloak admin REST API (paginated, retried, token-refreshing)
//! - Normalization of raw records into typed nodes with flat property bags
//! - Reference resolution into edges, with integrity issues reported instead of dropped silently
//! - Batched, idempotent loading with an optional clean pre-pass
//! - Per-realm pipeline with a bounded worker pool and a global deadline

pub mod error;
pub mod graph;
pub mod loader;
pub mod neo4j;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::Result;
use error::ExportError;
use pipeline::ExportOptions;
use serde::Deserialize;
use source::{AuthMode, RetryPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub keycloak: KeycloakYamlConfig,
    pub neo4j: Neo4jYamlConfig,
    pub export: ExportYamlConfig,
    pub retry: RetryPolicy,
}

/// Keycloak source section.
///
/// Exactly one authentication mode must end up configured (after env overrides):
/// `username` + `password` (optionally `totp`), `client_secret`, or `cert_path`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeycloakYamlConfig {
    pub url: String,
    /// Realm the admin client authenticates against
    pub realm: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
    pub client_secret: Option<String>,
    /// PEM file holding the client certificate and its private key
    pub cert_path: Option<PathBuf>,
    pub page_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for KeycloakYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            realm: "master".into(),
            client_id: "admin-cli".into(),
            username: None,
            password: None,
            totp: None,
            client_secret: None,
            cert_path: None,
            page_size: source::client::DEFAULT_PAGE_SIZE,
            request_timeout_secs: 30,
        }
    }
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            database: "neo4j".into(),
            max_connections: 8,
        }
    }
}

/// Export run section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportYamlConfig {
    /// Realm allow-list (empty = every realm)
    pub realms: Vec<String>,
    pub clean: bool,
    pub workers: usize,
    pub batch_size: usize,
    pub max_pages: usize,
    /// Global deadline in seconds (none = unbounded)
    pub timeout_secs: Option<u64>,
}

impl Default for ExportYamlConfig {
    fn default() -> Self {
        Self {
            realms: Vec::new(),
            clean: false,
            workers: pipeline::DEFAULT_WORKERS,
            batch_size: loader::DEFAULT_BATCH_SIZE,
            max_pages: source::DEFAULT_MAX_PAGES,
            timeout_secs: None,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub keycloak_url: String,
    pub auth_realm: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
    pub client_secret: Option<String>,
    pub cert_path: Option<PathBuf>,
    pub page_size: usize,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,

    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    pub neo4j_max_connections: usize,

    pub realms: Vec<String>,
    pub clean: bool,
    pub workers: usize,
    pub batch_size: usize,
    pub max_pages: usize,
    pub timeout: Option<Duration>,
}

/// Non-empty env var value.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);
        let kc = yaml.keycloak;

        Ok(Self {
            keycloak_url: env_var("KEYCLOAK_URL").unwrap_or(kc.url),
            auth_realm: env_var("KEYCLOAK_REALM").unwrap_or(kc.realm),
            client_id: env_var("KEYCLOAK_CLIENT_ID").unwrap_or(kc.client_id),
            username: env_var("KEYCLOAK_USER").or(kc.username),
            password: env_var("KEYCLOAK_PASSWORD").or(kc.password),
            totp: env_var("KEYCLOAK_TOTP").or(kc.totp),
            client_secret: env_var("KEYCLOAK_CLIENT_SECRET").or(kc.client_secret),
            cert_path: env_var("KEYCLOAK_CERT_PATH")
                .map(PathBuf::from)
                .or(kc.cert_path),
            page_size: kc.page_size.max(1),
            request_timeout: Duration::from_secs(kc.request_timeout_secs.max(1)),
            retry: yaml.retry,

            neo4j_uri: env_var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: env_var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: env_var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            neo4j_database: env_var("NEO4J_DATABASE").unwrap_or(yaml.neo4j.database),
            neo4j_max_connections: yaml.neo4j.max_connections.max(1),

            realms: yaml.export.realms,
            clean: yaml.export.clean,
            workers: yaml.export.workers.max(1),
            batch_size: yaml.export.batch_size.max(1),
            max_pages: yaml.export.max_pages.max(1),
            timeout: yaml.export.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }

    /// The single configured authentication mode.
    pub fn auth_mode(&self) -> std::result::Result<AuthMode, ExportError> {
        let mut modes = Vec::new();

        match (&self.username, &self.password) {
            (Some(username), Some(password)) => modes.push(AuthMode::Password {
                username: username.clone(),
                password: password.clone(),
                totp: self.totp.clone(),
            }),
            (Some(_), None) | (None, Some(_)) => {
                return Err(ExportError::Config(
                    "password authentication needs both a username and a password".into(),
                ))
            }
            (None, None) => {}
        }
        if let Some(secret) = &self.client_secret {
            modes.push(AuthMode::ClientSecret {
                secret: secret.clone(),
            });
        }
        if let Some(cert_path) = &self.cert_path {
            modes.push(AuthMode::ClientCertificate {
                cert_path: cert_path.clone(),
            });
        }

        if modes.len() != 1 {
            let names: Vec<&str> = modes.iter().map(AuthMode::name).collect();
            return Err(ExportError::Config(format!(
                "exactly one authentication mode must be configured (found {}: [{}])",
                modes.len(),
                names.join(", ")
            )));
        }
        Ok(modes.remove(0))
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            realms: self.realms.clone(),
            clean: self.clean,
            workers: self.workers,
            max_pages: self.max_pages,
            timeout: self.timeout,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
