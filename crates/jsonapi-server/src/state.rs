//! Application state shared across every request handler.

use jsonapi_auth::JwtConfig;
use jsonapi_core::{AppConfig, schema::SchemaRegistry};
use sqlx::PgPool;

/// Shared application state.
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,
    /// Compiled resource schema, swappable without restarting the process.
    pub schema: SchemaRegistry,
    /// Application configuration.
    pub config: AppConfig,
    /// JWT configuration derived from `config`.
    pub jwt_config: JwtConfig,
}

impl AppState {
    /// Recompile the schema from its declarative source and swap it in.
    pub async fn reload_schema(&self) -> jsonapi_core::error::Result<()> {
        self.schema.reload(crate::resources::descriptors()).await
    }
}
