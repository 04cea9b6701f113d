//! Runtime configuration for the JSON:API server.

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    // ========================================================================
    // Database Settings
    // ========================================================================
    /// PostgreSQL connection URI
    #[serde(default = "default_db_uri")]
    pub db_uri: String,

    /// Role for unauthenticated requests
    pub db_anon_role: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,

    /// Pool acquisition timeout in seconds
    #[serde(default = "default_pool_timeout")]
    pub db_pool_timeout: u64,

    // ========================================================================
    // Server Settings
    // ========================================================================
    /// Server host to bind
    #[serde(default = "default_host")]
    pub server_host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub server_port: u16,

    // ========================================================================
    // JWT Settings
    // ========================================================================
    /// JWT secret key (or JWKS URL)
    pub jwt_secret: Option<String>,

    /// JWT secret as base64
    #[serde(default)]
    pub jwt_secret_is_base64: bool,

    /// JWT audience claim to validate
    pub jwt_aud: Option<String>,

    /// JWT claim that identifies the calling principal's role
    #[serde(default = "default_jwt_role_claim")]
    pub jwt_role_claim_key: String,

    // ========================================================================
    // JSON:API Settings
    // ========================================================================
    /// Page size used when a request omits `page[size]`
    #[serde(default = "default_query_default_limit")]
    pub query_default_limit: i64,

    /// Hard ceiling on `page[size]`, regardless of what the client requests
    #[serde(default = "default_query_max_limit")]
    pub query_max_limit: i64,

    /// Whether offset-mode collection responses compute `meta.total`/`meta.pageCount`.
    /// Disabling this avoids a `COUNT(*)` query on large tables.
    #[serde(default = "default_true")]
    pub enable_pagination_counts: bool,

    /// Prefix prepended to all generated `links` (self/related/pagination)
    #[serde(default)]
    pub url_prefix: String,

    /// Reject requests whose `Content-Type` is not `application/vnd.api+json`
    #[serde(default = "default_true")]
    pub strict_content_type: bool,

    /// Maximum depth of a dotted `include` path, e.g. `author.publisher` is depth 2
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: u32,

    // ========================================================================
    // Logging Settings
    // ========================================================================
    /// Log level: crit, error, warn, info, debug
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_uri: default_db_uri(),
            db_anon_role: None,
            db_pool_size: default_pool_size(),
            db_pool_timeout: default_pool_timeout(),
            server_host: default_host(),
            server_port: default_port(),
            jwt_secret: None,
            jwt_secret_is_base64: false,
            jwt_aud: None,
            jwt_role_claim_key: default_jwt_role_claim(),
            query_default_limit: default_query_default_limit(),
            query_max_limit: default_query_max_limit(),
            enable_pagination_counts: true,
            url_prefix: String::new(),
            strict_content_type: true,
            max_include_depth: default_max_include_depth(),
            log_level: LogLevel::Error,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(uri) = std::env::var("DATABASE_URL") {
            config.db_uri = uri;
        }
        if let Ok(uri) = std::env::var("JSONAPI_DB_URI") {
            config.db_uri = uri;
        }
        if let Ok(role) = std::env::var("JSONAPI_DB_ANON_ROLE") {
            config.db_anon_role = Some(role);
        }
        if let Ok(size) = std::env::var("JSONAPI_DB_POOL") {
            if let Ok(n) = size.parse() {
                config.db_pool_size = n;
            }
        }
        if let Ok(secret) = std::env::var("JSONAPI_JWT_SECRET") {
            config.jwt_secret = Some(secret);
        }
        if let Ok(aud) = std::env::var("JSONAPI_JWT_AUD") {
            config.jwt_aud = Some(aud);
        }
        if let Ok(host) = std::env::var("JSONAPI_SERVER_HOST") {
            config.server_host = host;
        }
        if let Ok(port) = std::env::var("JSONAPI_SERVER_PORT") {
            if let Ok(p) = port.parse() {
                config.server_port = p;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.server_port = p;
            }
        }
        if let Ok(limit) = std::env::var("JSONAPI_QUERY_DEFAULT_LIMIT") {
            if let Ok(n) = limit.parse() {
                config.query_default_limit = n;
            }
        }
        if let Ok(limit) = std::env::var("JSONAPI_QUERY_MAX_LIMIT") {
            if let Ok(n) = limit.parse() {
                config.query_max_limit = n;
            }
        }
        if let Ok(prefix) = std::env::var("JSONAPI_URL_PREFIX") {
            config.url_prefix = prefix;
        }
        if let Ok(depth) = std::env::var("JSONAPI_MAX_INCLUDE_DEPTH") {
            if let Ok(n) = depth.parse() {
                config.max_include_depth = n;
            }
        }

        config
    }

    /// Clamp a requested `page[size]` to the configured ceiling, falling back
    /// to `query_default_limit` when the request omits one.
    pub fn effective_page_size(&self, requested: Option<i64>) -> i64 {
        requested
            .unwrap_or(self.query_default_limit)
            .clamp(1, self.query_max_limit)
    }
}

/// Log levels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Crit,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn to_tracing(&self) -> tracing::Level {
        match self {
            Self::Crit | Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
        }
    }
}

// Default value functions
fn default_db_uri() -> String {
    "postgresql://localhost/postgres".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_jwt_role_claim() -> String {
    "role".to_string()
}

fn default_query_default_limit() -> i64 {
    25
}

fn default_query_max_limit() -> i64 {
    100
}

fn default_max_include_depth() -> u32 {
    3
}

fn default_log_level() -> LogLevel {
    LogLevel::Error
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.db_pool_size, 10);
        assert_eq!(config.query_default_limit, 25);
        assert_eq!(config.query_max_limit, 100);
        assert_eq!(config.max_include_depth, 3);
    }

    #[test]
    fn test_effective_page_size_clamps_to_max() {
        let config = AppConfig::default();
        assert_eq!(config.effective_page_size(Some(1000)), 100);
        assert_eq!(config.effective_page_size(Some(5)), 5);
        assert_eq!(config.effective_page_size(None), 25);
    }
}
