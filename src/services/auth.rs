// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication orchestration.
//!
//! Handles:
//! - Email/password sign-in and registration against Firebase
//! - Microsoft sign-in federated into Firebase (`signInWithIdp`)
//! - Direct Microsoft Graph connection (the Outlook token silo)
//! - Serving a valid, refreshed Graph access token

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

use crate::config::{Config, MicrosoftApp};
use crate::error::{AuthError, Result};
use crate::models::{
    CallbackResult, FlowKind, MicrosoftToken, PendingAuthorizationRequest, ProviderTokens,
    UserProfile,
};
use crate::services::browser::{BrowserLauncher, SystemBrowser};
use crate::services::firebase::{FirebaseIdentityClient, IdpCredentials};
use crate::services::loopback::LoopbackListener;
use crate::services::microsoft::{self, AuthorizeParams, MicrosoftIdentityClient};
use crate::services::pkce;
use crate::services::session::Session;
use crate::services::token_store::TokenStore;

/// Random bytes behind `state` and `nonce`.
const OPAQUE_TOKEN_BYTES: usize = 32;

/// What a delegated flow does with the exchanged tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostExchange {
    /// Trade the Microsoft tokens for a Firebase identity.
    BridgeToFirebase,
    /// Store the tokens as the Graph token silo.
    PersistGraphToken,
}

impl From<FlowKind> for PostExchange {
    fn from(kind: FlowKind) -> Self {
        match kind {
            FlowKind::MicrosoftSignIn => PostExchange::BridgeToFirebase,
            FlowKind::OutlookConnect => PostExchange::PersistGraphToken,
        }
    }
}

enum FlowOutcome {
    Authenticated(Arc<UserProfile>),
    Connected,
}

/// Removes the pending request for its kind when the flow ends.
struct PendingGuard<'a> {
    pending: &'a DashMap<FlowKind, PendingAuthorizationRequest>,
    kind: FlowKind,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.kind);
    }
}

/// Authentication core owned by the host application.
pub struct AuthService {
    config: Config,
    firebase: FirebaseIdentityClient,
    microsoft: MicrosoftIdentityClient,
    token_store: TokenStore,
    session: Session,
    browser: Arc<dyn BrowserLauncher>,
    pending: DashMap<FlowKind, PendingAuthorizationRequest>,
    /// Last loaded/saved Graph token; the lock also serializes refreshes.
    token_cache: Mutex<Option<MicrosoftToken>>,
}

impl AuthService {
    /// Create the service, opening browsers with the desktop default.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_browser(config, Arc::new(SystemBrowser))
    }

    pub fn with_browser(config: Config, browser: Arc<dyn BrowserLauncher>) -> Result<Self> {
        let firebase = FirebaseIdentityClient::new(
            &config.firebase_identity_url,
            config.firebase_api_key.clone(),
            config.http_timeout,
        )?;
        let microsoft = MicrosoftIdentityClient::new(config.http_timeout)?;
        let token_store = TokenStore::new(config.token_path());

        Ok(Self {
            config,
            firebase,
            microsoft,
            token_store,
            session: Session::new(),
            browser,
            pending: DashMap::new(),
            token_cache: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.token_store
    }

    /// Profile of the signed-in user, if any.
    pub fn current_user(&self) -> Option<Arc<UserProfile>> {
        self.session.current()
    }

    // ─── Flow A: email/password ──────────────────────────────────

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Arc<UserProfile>> {
        let (email, password) = validate_credentials(email, password)?;

        let profile = self
            .firebase
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Password sign-in failed"))?;

        tracing::info!(uid = %profile.uid, "Signed in with password");
        Ok(self.session.set(profile))
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Arc<UserProfile>> {
        let (email, password) = validate_credentials(email, password)?;

        let profile = self
            .firebase
            .sign_up(email, password, display_name)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Registration failed"))?;

        tracing::info!(uid = %profile.uid, "Registered new account");
        Ok(self.session.set(profile))
    }

    // ─── Flows B and C: browser-delegated ────────────────────────

    /// Sign in with a Microsoft account and federate it into Firebase.
    pub async fn sign_in_with_microsoft(&self) -> Result<Arc<UserProfile>> {
        match self.run_delegated_flow(FlowKind::MicrosoftSignIn).await? {
            FlowOutcome::Authenticated(profile) => Ok(profile),
            FlowOutcome::Connected => Err(AuthError::Internal(anyhow::anyhow!(
                "sign-in flow finished without a profile"
            ))),
        }
    }

    /// Connect the Outlook mailbox and persist its Graph token.
    pub async fn connect_outlook(&self) -> Result<()> {
        self.run_delegated_flow(FlowKind::OutlookConnect).await?;
        Ok(())
    }

    async fn run_delegated_flow(&self, kind: FlowKind) -> Result<FlowOutcome> {
        let app = self.app_for(kind)?;

        let request = PendingAuthorizationRequest {
            state: pkce::generate_opaque_token(OPAQUE_TOKEN_BYTES),
            code_verifier: pkce::generate_verifier(),
            nonce: pkce::generate_opaque_token(OPAQUE_TOKEN_BYTES),
            created_at: Utc::now(),
        };
        let _guard = self.reserve(kind, request.clone())?;

        let mut listener = LoopbackListener::start(&app.redirect_uri).await?;
        let result = self
            .drive_delegated_flow(kind, app, &request, &mut listener)
            .await;
        listener.stop().await;

        match &result {
            Ok(_) => tracing::info!(flow = %kind, stage = "authenticated", "Delegated flow complete"),
            Err(e) => tracing::warn!(flow = %kind, stage = "failed", error = %e, "Delegated flow failed"),
        }
        result
    }

    async fn drive_delegated_flow(
        &self,
        kind: FlowKind,
        app: &MicrosoftApp,
        request: &PendingAuthorizationRequest,
        listener: &mut LoopbackListener,
    ) -> Result<FlowOutcome> {
        let redirect_uri = listener.redirect_uri().to_string();
        let authorize_url = self.microsoft.authorize_url(
            app,
            &AuthorizeParams {
                redirect_uri: &redirect_uri,
                state: &request.state,
                code_challenge: &pkce::derive_challenge(&request.code_verifier),
                nonce: &request.nonce,
            },
        );

        self.browser.open(&authorize_url)?;
        tracing::info!(flow = %kind, stage = "awaiting_redirect", "Waiting for browser redirect");

        let callback = listener.await_callback(self.config.callback_timeout).await?;
        let code = verify_callback(&callback, &request.state)?;

        tracing::info!(flow = %kind, stage = "exchanging_code", "Exchanging authorization code");
        let issued_at = Utc::now();
        let tokens = self
            .microsoft
            .exchange_authorization_code(app, code, &request.code_verifier, &redirect_uri)
            .await?;

        match PostExchange::from(kind) {
            PostExchange::BridgeToFirebase => {
                tracing::info!(flow = %kind, stage = "bridging_identity", "Federating into Firebase");
                let profile = self.bridge_identity(&tokens, &request.nonce).await?;
                tracing::info!(uid = %profile.uid, "Signed in with Microsoft");
                Ok(FlowOutcome::Authenticated(self.session.set(profile)))
            }
            PostExchange::PersistGraphToken => {
                let token = microsoft::token_record(&tokens, issued_at)?;
                let mut cache = self.token_cache.lock().await;
                self.token_store.save(&token).await?;
                *cache = Some(token);
                tracing::info!("Outlook connected");
                Ok(FlowOutcome::Connected)
            }
        }
    }

    async fn bridge_identity(&self, tokens: &ProviderTokens, nonce: &str) -> Result<UserProfile> {
        let credentials = IdpCredentials {
            id_token: tokens.id_token.as_deref(),
            access_token: tokens.access_token.as_deref(),
            nonce: Some(nonce),
        };
        self.firebase
            .sign_in_with_idp(&credentials, &self.config.firebase_oauth_request_uri)
            .await
    }

    fn app_for(&self, kind: FlowKind) -> Result<&MicrosoftApp> {
        let app = match kind {
            FlowKind::MicrosoftSignIn => self.config.microsoft_sign_in.as_ref(),
            FlowKind::OutlookConnect => self.config.outlook.as_ref(),
        };
        app.ok_or(AuthError::NotConfigured("MICROSOFT_CLIENT_ID"))
    }

    /// Claim the single slot for `kind`, or fail fast if a flow is running.
    fn reserve(
        &self,
        kind: FlowKind,
        request: PendingAuthorizationRequest,
    ) -> Result<PendingGuard<'_>> {
        match self.pending.entry(kind) {
            Entry::Occupied(_) => {
                tracing::warn!(flow = %kind, "Delegated flow already in progress");
                Err(AuthError::ListenerUnavailable(format!(
                    "a {} flow is already in progress",
                    kind
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(PendingGuard {
                    pending: &self.pending,
                    kind,
                })
            }
        }
    }

    /// True while a delegated flow of `kind` is outstanding.
    pub fn is_flow_pending(&self, kind: FlowKind) -> bool {
        self.pending.contains_key(&kind)
    }

    // ─── Graph token silo ────────────────────────────────────────

    /// Return a Graph access token that is not expired, refreshing if needed.
    ///
    /// A failed refresh drops the cached copy but leaves the token file in
    /// place, so a later reconnect can still replace it.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let mut cache = self.token_cache.lock().await;

        let token = match cache.take() {
            Some(token) => token,
            None => self.token_store.load().await?.ok_or(AuthError::NotConnected)?,
        };

        if !self.token_store.is_expired(&token) {
            let access_token = token.access_token.clone();
            *cache = Some(token);
            return Ok(access_token);
        }

        tracing::info!(expires_at = %token.expires_at, "Refreshing Outlook access token");
        let app = self.app_for(FlowKind::OutlookConnect)?;
        let refreshed = self
            .microsoft
            .refresh_access_token(app, &token.refresh_token)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Outlook token refresh failed"))?;

        if self.token_store.is_expired(&refreshed) {
            tracing::warn!(expires_at = %refreshed.expires_at, "Refreshed Outlook token is already expired");
            return Err(AuthError::InvalidTokenResponse(
                "refreshed token expires within the safety margin".to_string(),
            ));
        }

        self.token_store.save(&refreshed).await?;
        let access_token = refreshed.access_token.clone();
        *cache = Some(refreshed);
        Ok(access_token)
    }

    /// Forget the in-memory token; the next call reloads from disk.
    pub async fn invalidate_cached_token(&self) {
        self.token_cache.lock().await.take();
    }

    /// Whether a non-expired Graph token is stored.
    pub async fn is_outlook_connected(&self) -> bool {
        match self.token_store.load().await {
            Ok(Some(token)) => !self.token_store.is_expired(&token),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot read Outlook token");
                false
            }
        }
    }

    /// Drop the Graph token silo (memory and disk).
    pub async fn disconnect_outlook(&self) -> Result<()> {
        let mut cache = self.token_cache.lock().await;
        *cache = None;
        self.token_store.clear().await?;
        tracing::info!("Outlook disconnected");
        Ok(())
    }

    /// End the Firebase session. The Outlook token is left alone.
    pub fn sign_out(&self) {
        self.session.clear();
        tracing::info!("Signed out");
    }

    /// Redirect wait used by delegated flows.
    pub fn callback_timeout(&self) -> Duration {
        self.config.callback_timeout
    }
}

fn validate_credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str)> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::InvalidInput("email"));
    }
    if password.trim().is_empty() {
        return Err(AuthError::InvalidInput("password"));
    }
    Ok((email, password))
}

/// Check the redirect for a provider error and a matching `state`, then
/// return the authorization code.
fn verify_callback<'a>(callback: &'a CallbackResult, expected_state: &str) -> Result<&'a str> {
    if let Some(error) = callback.error.as_deref() {
        return Err(AuthError::ProviderDenied {
            error: error.to_string(),
            description: callback.error_description.clone(),
        });
    }

    let state = callback.state.as_deref().unwrap_or_default();
    if !bool::from(state.as_bytes().ct_eq(expected_state.as_bytes())) {
        tracing::warn!("OAuth state mismatch on redirect");
        return Err(AuthError::CsrfMismatch);
    }

    callback
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::InvalidTokenResponse("redirect carried no authorization code".into()))
}
