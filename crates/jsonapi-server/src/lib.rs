//! HTTP server library: wires JSON:API request handling over an
//! axum transport against a PostgreSQL backend.

pub mod app;
pub mod custom;
pub mod resources;
pub mod state;

pub use app::handle_request;
pub use state::AppState;
