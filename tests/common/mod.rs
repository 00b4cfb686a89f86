// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use jsonwebtoken::{EncodingKey, Header};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use todo_desktop_auth::config::Config;
use todo_desktop_auth::error::{AuthError, Result};
use todo_desktop_auth::services::{AuthService, BrowserLauncher};
use url::Url;
use wiremock::MockServer;

/// Authorization code handed out by the scripted provider.
#[allow(dead_code)]
pub const TEST_CODE: &str = "test-auth-code";

/// Token endpoint path under the mock authority.
#[allow(dead_code)]
pub const TOKEN_PATH: &str = "/common/oauth2/v2.0/token";

/// Config pointing every provider at `server` and storing tokens in `data_dir`.
#[allow(dead_code)]
pub fn test_config(server: &MockServer, data_dir: &Path) -> Config {
    let mut config = Config::test_default().with_mock_server(&server.uri());
    config.data_dir = data_dir.to_path_buf();
    config
}

/// How the scripted browser reacts to the authorize URL.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserScript {
    /// Redirect back with a code and the original state.
    Approve,
    /// Redirect back with a code and an attacker-chosen state.
    ForgeState,
    /// Redirect back with `error=access_denied`.
    Deny,
    /// Never redirect.
    Ignore,
    /// Fail to open at all.
    Fail,
}

/// Browser stand-in that plays the provider's side of the redirect.
pub struct ScriptedBrowser {
    script: BrowserScript,
    opened: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl ScriptedBrowser {
    pub fn new(script: BrowserScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Authorize URLs opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    /// Query parameters of the last authorize URL.
    pub fn last_authorize_params(&self) -> HashMap<String, String> {
        let url = self.opened().pop().expect("browser was never opened");
        query_map(&url)
    }
}

impl BrowserLauncher for ScriptedBrowser {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());

        let params = query_map(url);
        let redirect_uri = params["redirect_uri"].clone();
        let state = urlencoding::encode(&params["state"]).into_owned();

        let query = match self.script {
            BrowserScript::Approve => format!("code={}&state={}", TEST_CODE, state),
            BrowserScript::ForgeState => format!("code={}&state=forged-state", TEST_CODE),
            BrowserScript::Deny => format!(
                "error=access_denied&error_description=User%20declined&state={}",
                state
            ),
            BrowserScript::Ignore => return Ok(()),
            BrowserScript::Fail => return Err(AuthError::Browser("no browser available".into())),
        };

        let target = format!("{}?{}", redirect_uri, query);
        tokio::spawn(async move {
            let client = reqwest::Client::builder().no_proxy().build().unwrap();
            let _ = client.get(&target).send().await;
        });
        Ok(())
    }
}

/// Build a service wired to a scripted browser.
#[allow(dead_code)]
pub fn test_service(config: Config, script: BrowserScript) -> (Arc<AuthService>, Arc<ScriptedBrowser>) {
    let browser = ScriptedBrowser::new(script);
    let service = AuthService::with_browser(config, browser.clone())
        .expect("Failed to build AuthService");
    (Arc::new(service), browser)
}

/// Unsigned-for-our-purposes ID token carrying `claims`.
#[allow(dead_code)]
pub fn mint_id_token(claims: serde_json::Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-signing-secret"),
    )
    .expect("Failed to mint ID token")
}

/// Decode an `application/x-www-form-urlencoded` body.
#[allow(dead_code)]
pub fn form_map(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

#[allow(dead_code)]
pub fn query_map(url: &str) -> HashMap<String, String> {
    Url::parse(url)
        .expect("valid URL")
        .query_pairs()
        .into_owned()
        .collect()
}
