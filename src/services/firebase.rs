// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firebase Identity Platform REST client.
//!
//! Covers `accounts:signInWithPassword`, `accounts:signUp` and the
//! `accounts:signInWithIdp` federation bridge.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::models::user::non_blank;
use crate::models::UserProfile;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const MICROSOFT_PROVIDER_ID: &str = "microsoft.com";

/// Microsoft credentials handed to `signInWithIdp`.
#[derive(Debug, Clone, Default)]
pub struct IdpCredentials<'a> {
    pub id_token: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub nonce: Option<&'a str>,
}

/// Client for the Identity Toolkit v1 endpoints.
#[derive(Clone)]
pub struct FirebaseIdentityClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl FirebaseIdentityClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed building HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Sign in an existing email/password account.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<UserProfile> {
        let body = PasswordRequest {
            email,
            password,
            display_name: None,
            return_secure_token: true,
        };
        let response: AccountResponse = self.post("signInWithPassword", &body).await?;
        response.into_profile(email)
    }

    /// Create an email/password account.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<UserProfile> {
        let body = PasswordRequest {
            email,
            password,
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            return_secure_token: true,
        };
        let mut response: AccountResponse = self.post("signUp", &body).await?;
        // signUp does not echo displayName back.
        if response.display_name.is_none() {
            response.display_name = display_name.map(str::to_string);
        }
        response.into_profile(email)
    }

    /// Exchange Microsoft tokens for a Firebase identity.
    pub async fn sign_in_with_idp(
        &self,
        credentials: &IdpCredentials<'_>,
        request_uri: &str,
    ) -> Result<UserProfile> {
        let body = IdpRequest {
            post_body: idp_post_body(credentials),
            request_uri,
            return_secure_token: true,
            return_idp_credential: true,
        };

        let response: IdpResponse = self.post("signInWithIdp", &body).await.map_err(|e| match e {
            AuthError::NetworkUnavailable(_)
            | AuthError::NotConfigured(_)
            | AuthError::AccountDisabled => e,
            other => AuthError::FederationFailed(other.to_string()),
        })?;

        if let Some(message) = non_blank(response.error_message.clone()) {
            tracing::warn!(error = %message, "signInWithIdp reported an error");
            return Err(AuthError::FederationFailed(message));
        }

        let email = resolve_idp_email(&response, credentials.id_token).ok_or_else(|| {
            AuthError::FederationFailed("no email address available for the Microsoft account".into())
        })?;

        let uid = response
            .local_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuthError::FederationFailed("response carried no localId".into()))?;

        Ok(UserProfile::new(uid, email, response.display_name, response.photo_url))
    }

    async fn post<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: for<'de> Deserialize<'de>,
    {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AuthError::NotConfigured("FIREBASE_API_KEY"))?;

        let url = format!(
            "{}/accounts:{}?key={}",
            self.base_url,
            method,
            urlencoding::encode(api_key)
        );

        let payload = serde_json::to_vec(body)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed encoding request: {}", e)))?;

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(AuthError::from_transport)?;

        if !status.is_success() {
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_default();
            tracing::warn!(method, status = %status, code = %code, "Identity Toolkit request failed");
            if code.is_empty() && status.is_server_error() {
                return Err(AuthError::NetworkUnavailable(format!(
                    "Identity Toolkit returned {}",
                    status
                )));
            }
            return Err(AuthError::from_firebase_code(&code, text));
        }

        serde_json::from_str(&text)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("unexpected {} response: {}", method, e)))
    }
}

/// Form-encoded `postBody` for `signInWithIdp`; blank values are skipped.
fn idp_post_body(credentials: &IdpCredentials<'_>) -> String {
    let mut pairs = vec![format!("providerId={}", urlencoding::encode(MICROSOFT_PROVIDER_ID))];
    for (key, value) in [
        ("id_token", credentials.id_token),
        ("access_token", credentials.access_token),
        ("nonce", credentials.nonce),
    ] {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            pairs.push(format!("{}={}", key, urlencoding::encode(v)));
        }
    }
    pairs.join("&")
}

/// `email` field, then provider user info, then the ID token claims.
fn resolve_idp_email(response: &IdpResponse, id_token: Option<&str>) -> Option<String> {
    non_blank(response.email.clone())
        .or_else(|| {
            response
                .provider_user_info
                .iter()
                .find_map(|info| non_blank(info.email.clone()))
        })
        .or_else(|| id_token.and_then(email_from_id_token))
}

/// Read `email` or `preferred_username` from an unverified JWT payload.
pub(crate) fn email_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;

    ["email", "preferred_username"].iter().find_map(|claim| {
        claims
            .get(claim)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
    photo_url: Option<String>,
}

impl AccountResponse {
    fn into_profile(self, fallback_email: &str) -> Result<UserProfile> {
        let uid = non_blank(self.local_id)
            .ok_or_else(|| AuthError::InvalidTokenResponse("response carried no localId".into()))?;
        let email = non_blank(self.email).unwrap_or_else(|| fallback_email.to_string());
        Ok(UserProfile::new(uid, email, self.display_name, self.photo_url))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdpResponse {
    local_id: Option<String>,
    display_name: Option<String>,
    email: Option<String>,
    photo_url: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderUserInfo>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct ProviderUserInfo {
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}
