// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication error types with classified, UI-safe messages.

use std::time::Duration;

/// Firebase error codes that mean "the email/password pair is wrong".
const WRONG_CREDENTIAL_CODES: &[&str] = &[
    "INVALID_PASSWORD",
    "EMAIL_NOT_FOUND",
    "INVALID_LOGIN_CREDENTIALS",
];

/// Every failure the authentication core can report to the host.
///
/// Provider status codes and bodies are kept for diagnostics but are never
/// part of [`AuthError::user_message`] for credential-related kinds.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials ({code})")]
    InvalidCredentials { code: String, body: String },

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("OAuth state mismatch")]
    CsrfMismatch,

    #[error("Provider denied authorization: {error}")]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Timed out after {0:?} waiting for the authorization redirect")]
    AuthorizationTimeout(Duration),

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Identity federation failed: {0}")]
    FederationFailed(String),

    #[error("Callback listener unavailable: {0}")]
    ListenerUnavailable(String),

    #[error("Outlook is not connected")]
    NotConnected,

    #[error("Invalid input: {0} must not be blank")]
    InvalidInput(&'static str),

    #[error("Missing configuration: {0}")]
    NotConfigured(&'static str),

    #[error("Could not open a browser: {0}")]
    Browser(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Graph API error {status}: {body}")]
    GraphApi { status: u16, body: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        AuthError::NetworkUnavailable(err.to_string())
    }

    /// Classify a Firebase Identity Toolkit error code.
    ///
    /// `code` is the `error.message` field of the provider's error body,
    /// which may carry a trailing explanation (`"WEAK_PASSWORD : ..."`).
    pub fn from_firebase_code(code: &str, body: String) -> Self {
        let code = code.split(':').next().unwrap_or_default().trim().to_string();
        if code == "USER_DISABLED" {
            return AuthError::AccountDisabled;
        }
        AuthError::InvalidCredentials { code, body }
    }

    /// True when the provider said the email/password pair is wrong.
    pub fn is_wrong_credentials(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials { code, .. }
            if WRONG_CREDENTIAL_CODES.contains(&code.as_str()))
    }

    /// True when re-initiating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthError::AuthorizationTimeout(_)
                | AuthError::NetworkUnavailable(_)
                | AuthError::ListenerUnavailable(_)
        )
    }

    /// Short message that is safe to show to the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials { .. } if self.is_wrong_credentials() => {
                "Wrong email or password"
            }
            AuthError::AccountDisabled => "Your account has been disabled",
            AuthError::NetworkUnavailable(_) => {
                "Cannot reach the server. Please check your network connection"
            }
            AuthError::InvalidInput(_) => "Please enter both email and password",
            AuthError::CsrfMismatch => "Sign-in was rejected for security reasons. Please try again",
            AuthError::ProviderDenied { .. } => "Sign-in was cancelled or denied",
            AuthError::AuthorizationTimeout(_) => "Sign-in timed out. Please try again",
            AuthError::ListenerUnavailable(_) => {
                "Another sign-in is already in progress. Close it and try again"
            }
            AuthError::NotConnected => "Outlook is not connected",
            AuthError::Browser(_) => "Could not open the web browser",
            _ => "Sign-in failed. Please try again",
        }
    }
}

/// Result type alias for the authentication core.
pub type Result<T> = std::result::Result<T, AuthError>;
