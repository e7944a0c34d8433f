//! # Identity
//!
//! Sign-in itself happens in the browser against Firebase. The server only
//! receives the resulting ID token as `Authorization: Bearer <token>` and asks
//! the identity provider who it belongs to.
//!
//! A request without a well-formed bearer header, or whose token does not
//! verify, is rejected before any store access.
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{error::AppError, state::State, store::Store};

const LOOKUP_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub trait Verifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> impl Future<Output = Result<Identity, AppError>> + Send;
}

pub struct FirebaseVerifier {
    client: Client,
    api_key: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

impl FirebaseVerifier {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
        }
    }
}

impl Verifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let response = self
            .client
            .post(LOOKUP_ENDPOINT)
            .query(&[("key", &self.api_key)])
            .json(&json!({ "idToken": token }))
            .send()
            .await
            .map_err(|e| {
                warn!("Identity provider unreachable: {e}");
                AppError::Unauthenticated
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Token rejected by identity provider");
            return Err(AppError::Unauthenticated);
        }

        let lookup: LookupResponse = response.json().await.map_err(|e| {
            warn!("Unreadable identity provider response: {e}");
            AppError::Unauthenticated
        })?;

        lookup
            .users
            .into_iter()
            .next()
            .map(|user| Identity {
                uid: user.local_id,
                email: user.email,
                display_name: user.display_name,
            })
            .ok_or(AppError::Unauthenticated)
    }
}

/// Fixed token table, for local runs and router tests.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Identity>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: &str, uid: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            Identity {
                uid: uid.to_string(),
                email: Some(format!("{uid}@example.com")),
                display_name: None,
            },
        );
        self
    }
}

impl Verifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AppError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

pub fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)
}

impl<S: Store, V: Verifier> FromRequestParts<Arc<State<S, V>>> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State<S, V>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        state.verifier.verify(token).await
    }
}
