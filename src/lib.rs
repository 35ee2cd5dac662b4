pub mod admin;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod mailer;
pub mod models;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod sink;
pub mod sites;
pub mod turnstile;
pub mod validate;

// Re-export commonly used items for tests / external users
pub use auth::AccessGate;
pub use cors::CorsPolicy;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
