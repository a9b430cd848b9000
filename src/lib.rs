pub mod aggregation;
pub mod api;
pub mod auth;
pub mod builder;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod local;
pub mod models;
pub mod ordering;
pub mod progress;
pub mod question_types;
pub mod sequence;
pub mod session;
pub mod validation;

use auth::{SessionGuard, TokenStore};
use config::ClientConfig;
use events::EventBus;

/// Wires the token store, session guard and HTTP backend for `config`.
pub fn build_http_backend(config: &ClientConfig, events: EventBus) -> anyhow::Result<api::HttpBackend> {
    let tokens = TokenStore::new(config.token.clone());
    let session = SessionGuard::new(tokens, events);
    api::HttpBackend::new(config.clone(), session)
}
