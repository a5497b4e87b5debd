//! Client for the hosted auth service (GoTrue-compatible REST API).
//!
//! Handlers only see the [`AuthProvider`] trait; the HTTP client lives in
//! [`GoTrueClient`].

use crate::config::AuthConfig;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider answered with a client error; `message` is its own wording.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("auth provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth provider returned {status}")]
    Unavailable { status: u16 },

    #[error("admin API not configured")]
    AdminUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub created_at: Option<String>,
    pub email_confirmed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub user: Option<AuthUser>,
}

/// Result of creating an account. `session` is absent when the provider
/// requires email confirmation before issuing tokens.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;

    /// Resolve an access token to its user.
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;

    /// Whether the service-role (admin) API is available.
    fn has_admin(&self) -> bool;

    async fn admin_get_user(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError>;

    async fn admin_confirm_email(&self, id: Uuid) -> Result<(), AuthError>;
}

pub type SharedAuth = Arc<dyn AuthProvider>;

pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: Option<String>,
}

impl GoTrueClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            service_role_key: config.service_role_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn public(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.anon_key)
    }

    fn admin(&self, builder: RequestBuilder) -> Result<RequestBuilder, AuthError> {
        let key = self
            .service_role_key
            .as_deref()
            .ok_or(AuthError::AdminUnavailable)?;
        Ok(builder.header("apikey", key).bearer_auth(key))
    }
}

#[async_trait]
impl AuthProvider for GoTrueClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let resp = self
            .public(self.http.post(self.endpoint("signup")))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: Value = check(resp).await?.json().await?;
        Ok(parse_sign_up(body))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let resp = self
            .public(self.http.post(self.endpoint("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let resp = self
            .public(self.http.get(self.endpoint("user")))
            .bearer_auth(access_token)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    fn has_admin(&self) -> bool {
        self.service_role_key.is_some()
    }

    async fn admin_get_user(&self, id: Uuid) -> Result<Option<AuthUser>, AuthError> {
        let resp = self
            .admin(self.http.get(self.endpoint(&format!("admin/users/{id}"))))?
            .send()
            .await?;
        optional_user(resp).await
    }

    async fn admin_confirm_email(&self, id: Uuid) -> Result<(), AuthError> {
        let resp = self
            .admin(self.http.put(self.endpoint(&format!("admin/users/{id}"))))?
            .json(&json!({ "email_confirm": true }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.is_server_error() {
        return Err(AuthError::Unavailable {
            status: status.as_u16(),
        });
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    Err(AuthError::Rejected {
        status: status.as_u16(),
        message: error_message(&body).unwrap_or_else(|| status.to_string()),
    })
}

async fn optional_user(resp: Response) -> Result<Option<AuthUser>, AuthError> {
    if resp.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    Ok(Some(check(resp).await?.json().await?))
}

/// The provider reports errors under several keys depending on the endpoint.
fn error_message(body: &Value) -> Option<String> {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Signup returns a full session when auto-confirm is on, and a bare user
/// object otherwise.
fn parse_sign_up(body: Value) -> SignUpOutcome {
    if body.get("access_token").is_some() {
        let session: Option<AuthSession> = serde_json::from_value(body).ok();
        let user = session.as_ref().and_then(|s| s.user.clone());
        return SignUpOutcome { user, session };
    }
    let user = body
        .get("user")
        .cloned()
        .or(Some(body))
        .and_then(|v| serde_json::from_value::<AuthUser>(v).ok());
    SignUpOutcome {
        user,
        session: None,
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory provider: `tokens` maps access tokens to users. With
    /// `outage` set every token lookup fails as a provider 5xx.
    #[derive(Default)]
    pub struct StaticAuthProvider {
        pub tokens: HashMap<String, AuthUser>,
        pub outage: bool,
    }

    impl StaticAuthProvider {
        pub fn with_token(mut self, token: &str, id: Uuid) -> Self {
            self.tokens.insert(
                token.to_string(),
                AuthUser {
                    id,
                    email: Some(format!("{id}@test.local")),
                    created_at: None,
                    email_confirmed_at: None,
                },
            );
            self
        }
    }

    fn rejected(message: &str) -> AuthError {
        AuthError::Rejected {
            status: 400,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl AuthProvider for StaticAuthProvider {
        async fn sign_up(&self, _email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
            Err(rejected("signups disabled"))
        }

        async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthSession, AuthError> {
            Err(rejected("Invalid login credentials"))
        }

        async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
            if self.outage {
                return Err(AuthError::Unavailable { status: 503 });
            }
            self.tokens
                .get(access_token)
                .cloned()
                .ok_or_else(|| rejected("invalid JWT"))
        }

        fn has_admin(&self) -> bool {
            false
        }

        async fn admin_get_user(&self, _id: Uuid) -> Result<Option<AuthUser>, AuthError> {
            Err(AuthError::AdminUnavailable)
        }

        async fn admin_confirm_email(&self, _id: Uuid) -> Result<(), AuthError> {
            Err(AuthError::AdminUnavailable)
        }
    }
}
