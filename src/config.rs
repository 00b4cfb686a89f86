// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication configuration loaded from environment variables.
//!
//! Values are read once at startup. Blank variables count as unset so a
//! half-filled `.env` file behaves the same as a missing entry.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FIREBASE_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com/common";
const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/oauth2/callback";
const DEFAULT_GRAPH_API_URL: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_SIGN_IN_SCOPES: &str = "openid profile email offline_access";
const DEFAULT_OUTLOOK_SCOPES: &str = "openid profile email offline_access Mail.Send Mail.ReadWrite";
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 180;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DATA_DIR_NAME: &str = ".todo-desktop";

/// Registration of one Microsoft identity platform application flow.
#[derive(Debug, Clone)]
pub struct MicrosoftApp {
    pub client_id: String,
    /// Only confidential clients have one; public desktop clients omit it.
    pub client_secret: Option<String>,
    /// Authority without trailing slash, e.g. `https://login.microsoftonline.com/common`.
    pub authority: String,
    /// Must match the redirect registered with the provider exactly.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl MicrosoftApp {
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority)
    }

    /// Space separated scope string as sent on the wire.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Application configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Firebase Web API key; password and federation flows need it.
    pub firebase_api_key: Option<String>,
    /// Identity Toolkit REST base URL.
    pub firebase_identity_url: String,
    /// `requestUri` sent with `signInWithIdp`.
    pub firebase_oauth_request_uri: String,
    /// Microsoft sign-in federated into Firebase.
    pub microsoft_sign_in: Option<MicrosoftApp>,
    /// Direct Graph mailbox connection (separate token silo).
    pub outlook: Option<MicrosoftApp>,
    /// Microsoft Graph base URL.
    pub graph_api_url: String,
    /// Directory holding the persisted Outlook token.
    pub data_dir: PathBuf,
    /// Upper bound for waiting on the browser redirect.
    pub callback_timeout: Duration,
    /// Per-request network timeout for provider calls.
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let data_dir = match read_var("TODO_DESKTOP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .map(|home| home.join(DATA_DIR_NAME))
                .ok_or(ConfigError::NoHomeDir)?,
        };

        let authority = normalize_authority(
            &read_var("MICROSOFT_AUTHORITY").unwrap_or_else(|| DEFAULT_MICROSOFT_AUTHORITY.into()),
        );
        let client_id = read_var("MICROSOFT_CLIENT_ID");
        let client_secret = read_var("MICROSOFT_CLIENT_SECRET");
        let sign_in_redirect =
            read_var("MICROSOFT_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.into());
        let outlook_redirect =
            read_var("OUTLOOK_REDIRECT_URI").unwrap_or_else(|| sign_in_redirect.clone());

        let microsoft_sign_in = client_id.clone().map(|client_id| MicrosoftApp {
            client_id,
            client_secret: client_secret.clone(),
            authority: authority.clone(),
            redirect_uri: sign_in_redirect,
            scopes: read_scopes("MICROSOFT_SCOPES", DEFAULT_SIGN_IN_SCOPES),
        });

        let outlook = client_id.map(|client_id| MicrosoftApp {
            client_id,
            client_secret,
            authority,
            redirect_uri: outlook_redirect,
            scopes: read_scopes("OUTLOOK_SCOPES", DEFAULT_OUTLOOK_SCOPES),
        });

        Ok(Self {
            firebase_api_key: read_var("FIREBASE_API_KEY"),
            firebase_identity_url: read_var("FIREBASE_IDENTITY_URL")
                .unwrap_or_else(|| DEFAULT_FIREBASE_IDENTITY_URL.into()),
            firebase_oauth_request_uri: read_var("FIREBASE_OAUTH_REQUEST_URI")
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.into()),
            microsoft_sign_in,
            outlook,
            graph_api_url: read_var("GRAPH_API_URL").unwrap_or_else(|| DEFAULT_GRAPH_API_URL.into()),
            data_dir,
            callback_timeout: read_secs("AUTH_CALLBACK_TIMEOUT_SECS", DEFAULT_CALLBACK_TIMEOUT_SECS),
            http_timeout: read_secs("AUTH_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
        })
    }

    /// Fully populated config for tests. Endpoints point at production hosts
    /// and are expected to be overridden with a mock server URL.
    pub fn test_default() -> Self {
        let app = MicrosoftApp {
            client_id: "test-client-id".to_string(),
            client_secret: None,
            authority: DEFAULT_MICROSOFT_AUTHORITY.to_string(),
            redirect_uri: "http://127.0.0.1:0/oauth2/callback".to_string(),
            scopes: split_scopes(DEFAULT_SIGN_IN_SCOPES),
        };

        Self {
            firebase_api_key: Some("test-api-key".to_string()),
            firebase_identity_url: DEFAULT_FIREBASE_IDENTITY_URL.to_string(),
            firebase_oauth_request_uri: DEFAULT_REDIRECT_URI.to_string(),
            microsoft_sign_in: Some(app.clone()),
            outlook: Some(MicrosoftApp {
                scopes: split_scopes(DEFAULT_OUTLOOK_SCOPES),
                ..app
            }),
            graph_api_url: DEFAULT_GRAPH_API_URL.to_string(),
            data_dir: env::temp_dir().join("todo-desktop-auth-test"),
            callback_timeout: Duration::from_secs(5),
            http_timeout: Duration::from_secs(5),
        }
    }

    /// Point every provider endpoint at a single mock server.
    pub fn with_mock_server(mut self, base_url: &str) -> Self {
        self.firebase_identity_url = format!("{}/v1", base_url);
        self.graph_api_url = format!("{}/graph/v1.0", base_url);
        let authority = format!("{}/common", base_url);
        for app in [&mut self.microsoft_sign_in, &mut self.outlook]
            .into_iter()
            .flatten()
        {
            app.authority = authority.clone();
        }
        self
    }

    /// Location of the persisted Outlook token.
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join("outlook_token.json")
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_secs(name: &str, default: u64) -> Duration {
    let secs = read_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn read_scopes(name: &str, default: &str) -> Vec<String> {
    let scopes = read_var(name).map(|v| split_scopes(&v)).unwrap_or_default();
    if scopes.is_empty() {
        split_scopes(default)
    } else {
        scopes
    }
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(String::from).collect()
}

fn normalize_authority(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot resolve home directory for application data")]
    NoHomeDir,
}
