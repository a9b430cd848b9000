use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::events::{ClientEvent, EventBus};

/// Tokens expiring within this many seconds are refreshed proactively by callers.
pub const EXPIRY_WARNING_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginCredentials {
    /// Email or username.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthToken {
    pub access_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
}

fn bearer() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Reads the JWT payload without checking the signature.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn remaining_secs(token: &str, now: DateTime<Utc>) -> i64 {
    decode_claims(token)
        .and_then(|c| c.exp)
        .map(|exp| (exp - now.timestamp()).max(0))
        .unwrap_or(0)
}

/// Tokens without a readable `exp` are treated as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token).and_then(|c| c.exp) {
        Some(exp) => exp <= now.timestamp(),
        None => true,
    }
}

pub fn is_expiring_soon(token: &str, now: DateTime<Utc>) -> bool {
    let remaining = remaining_secs(token, now);
    remaining > 0 && remaining < EXPIRY_WARNING_SECS
}

/// Holds the bearer token for the current user session.
#[derive(Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(initial.filter(|t| !t.trim().is_empty()))),
        }
    }

    pub async fn save(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn clear(&self) {
        self.token.write().await.take();
    }

    pub async fn claims(&self) -> Option<TokenClaims> {
        self.token().await.as_deref().and_then(decode_claims)
    }

    pub async fn is_valid(&self, now: DateTime<Utc>) -> bool {
        match self.token().await {
            Some(token) => !is_expired(&token, now),
            None => false,
        }
    }
}

/// Ends the user session: drops credentials and tells the UI to route to login.
#[derive(Clone)]
pub struct SessionGuard {
    tokens: TokenStore,
    events: EventBus,
}

impl SessionGuard {
    pub fn new(tokens: TokenStore, events: EventBus) -> Self {
        Self { tokens, events }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub async fn login(&self, token: &AuthToken) {
        self.tokens.save(token.access_token.clone()).await;
        info!("session started");
    }

    pub async fn terminate(&self, return_to: Option<String>, request_id: Option<String>) {
        self.tokens.clear().await;
        warn!("session terminated after unauthorized response");
        self.events
            .publish(ClientEvent::SessionExpired { return_to }, request_id);
    }
}
