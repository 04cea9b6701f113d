//! JSON:API HTTP server.
//!
//! Exposes a declaratively-described resource graph over JSON:API v1.1,
//! backed by PostgreSQL.

use anyhow::Result;
use axum::{
    http::Method,
    routing::any,
    Router,
};
use jsonapi_core::schema::SchemaRegistry;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod custom;
mod resources;
mod state;

use app::handle_request;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "jsonapi_server=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = jsonapi_core::AppConfig::from_env();
    info!("starting jsonapi-server");
    info!("database: {}", mask_db_uri(&config.db_uri));

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_size)
        .acquire_timeout(std::time::Duration::from_secs(config.db_pool_timeout))
        .connect(&config.db_uri)
        .await?;
    info!("connected to database");

    let schema = SchemaRegistry::from_descriptors(resources::descriptors()).await?;
    info!("schema compiled: {} resource types", schema.current().await?.resources.len());

    let state = Arc::new(AppState {
        pool,
        schema,
        jwt_config: jsonapi_auth::JwtConfig {
            secret: config.jwt_secret.clone(),
            secret_is_base64: config.jwt_secret_is_base64,
            audience: config.jwt_aud.clone(),
            role_claim_key: config.jwt_role_claim_key.clone(),
            anon_role: config.db_anon_role.clone(),
        },
        config,
    });

    let app = Router::new()
        .merge(custom::custom_router())
        .route("/{*path}", any(handle_request))
        .route("/", any(handle_request))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                    Method::HEAD,
                ])
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Mask the credentials portion of a database URI for logging.
fn mask_db_uri(uri: &str) -> String {
    if let Some(at_pos) = uri.find('@') {
        if let Some(proto_end) = uri.find("://") {
            return format!("{}://***@{}", &uri[..proto_end], &uri[at_pos + 1..]);
        }
    }
    uri.to_string()
}
