// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Microsoft identity platform client.
//!
//! Handles:
//! - Authorize URL construction (PKCE S256, `response_mode=query`)
//! - Authorization-code exchange
//! - Refresh-token grant

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::config::MicrosoftApp;
use crate::error::{AuthError, Result};
use crate::models::{MicrosoftToken, ProviderTokens};

/// Longest access-token lifetime accepted from the token endpoint.
pub const MAX_EXPIRES_IN_SECS: i64 = 7 * 24 * 60 * 60;

/// Parameters of one authorize request.
#[derive(Debug, Clone)]
pub struct AuthorizeParams<'a> {
    pub redirect_uri: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
    pub nonce: &'a str,
}

/// Stateless wrapper over the `{authority}/oauth2/v2.0/*` endpoints.
#[derive(Clone)]
pub struct MicrosoftIdentityClient {
    http: reqwest::Client,
}

impl MicrosoftIdentityClient {
    /// Create a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed building HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Build the browser URL for the authorize endpoint.
    pub fn authorize_url(&self, app: &MicrosoftApp, params: &AuthorizeParams<'_>) -> String {
        let scope = app.scope_param();
        let query = [
            ("client_id", app.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", params.redirect_uri),
            ("response_mode", "query"),
            ("scope", scope.as_str()),
            ("state", params.state),
            ("prompt", "select_account"),
            ("code_challenge", params.code_challenge),
            ("code_challenge_method", "S256"),
            ("nonce", params.nonce),
        ]
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

        format!("{}?{}", app.authorize_endpoint(), query)
    }

    /// Exchange an authorization code (plus PKCE verifier) for tokens.
    pub async fn exchange_authorization_code(
        &self,
        app: &MicrosoftApp,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<ProviderTokens> {
        let scope = app.scope_param();
        let mut form = vec![
            ("client_id", app.client_id.as_str()),
            ("scope", scope.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = app.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self.post_token_form(app, &form).await?;

        let has_id = response.id_token.as_deref().is_some_and(|t| !t.is_empty());
        let has_access = response.access_token.as_deref().is_some_and(|t| !t.is_empty());
        if !has_id && !has_access {
            return Err(AuthError::InvalidTokenResponse(
                "response carried neither id_token nor access_token".to_string(),
            ));
        }

        Ok(ProviderTokens {
            id_token: response.id_token.filter(|t| !t.is_empty()),
            access_token: response.access_token.filter(|t| !t.is_empty()),
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_in: response.expires_in,
        })
    }

    /// Redeem a refresh token for a new Graph token record.
    ///
    /// Microsoft may omit `refresh_token` on refresh; the previous one stays
    /// valid in that case and is carried over.
    pub async fn refresh_access_token(
        &self,
        app: &MicrosoftApp,
        refresh_token: &str,
    ) -> Result<MicrosoftToken> {
        let issued_at = Utc::now();
        let scope = app.scope_param();
        let mut form = vec![
            ("client_id", app.client_id.as_str()),
            ("scope", scope.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = app.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self.post_token_form(app, &form).await?;
        let tokens = ProviderTokens {
            id_token: response.id_token,
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_in: response.expires_in,
        };
        token_record(&tokens, issued_at)
    }

    async fn post_token_form(
        &self,
        app: &MicrosoftApp,
        form: &[(&str, &str)],
    ) -> Result<TokenEndpointResponse> {
        let response = self
            .http
            .post(app.token_endpoint())
            .form(form)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Microsoft token endpoint rejected request");
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidTokenResponse(format!("JSON parse error: {}", e)))
    }
}

/// Map exchanged tokens into the persisted Graph token record.
///
/// `expires_at` is `issued_at + expires_in`.
pub fn token_record(tokens: &ProviderTokens, issued_at: DateTime<Utc>) -> Result<MicrosoftToken> {
    let access_token = tokens
        .access_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidTokenResponse("missing access_token".to_string()))?;
    let refresh_token = tokens
        .refresh_token
        .clone()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            AuthError::InvalidTokenResponse(
                "missing refresh_token (is offline_access requested?)".to_string(),
            )
        })?;
    let expires_in = tokens
        .expires_in
        .ok_or_else(|| AuthError::InvalidTokenResponse("missing expires_in".to_string()))?;

    if !(1..=MAX_EXPIRES_IN_SECS).contains(&expires_in) {
        tracing::warn!(expires_in, "Token endpoint returned an out-of-range lifetime");
        return Err(AuthError::InvalidTokenResponse(format!(
            "expires_in {} outside 1..={}",
            expires_in, MAX_EXPIRES_IN_SECS
        )));
    }

    MicrosoftToken::try_issued(access_token, refresh_token, issued_at, expires_in).ok_or_else(|| {
        AuthError::InvalidTokenResponse("token expiry is not a representable time".to_string())
    })
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    expires_in: Option<i64>,
}

/// `expires_in` is normally a number; some proxies stringify it.
fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}
