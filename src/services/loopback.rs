// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Loopback HTTP listener that captures one OAuth redirect.
//!
//! The listener binds the exact host/port/path of the registered redirect URI,
//! resolves a single-shot channel with the first request that reaches that
//! path, and answers every later request with a generic page.

use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::error::{AuthError, Result};
use crate::models::CallbackResult;

/// How long `stop` waits for in-flight responses before aborting the server.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Signed in</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding: 48px;\">\
<h1>Sign-in complete</h1><p>You can close this window and return to the app.</p></body></html>";

const FAILURE_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Sign-in failed</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding: 48px;\">\
<h1>Sign-in failed</h1><p>You can close this window and try again from the app.</p></body></html>";

const ALREADY_COMPLETED_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Already completed</title></head>\
<body style=\"font-family: sans-serif; text-align: center; padding: 48px;\">\
<h1>Already completed</h1><p>This sign-in request has already been handled.</p></body></html>";

/// Single-resolution slot shared with the request handler.
struct CallbackSlot {
    resolved: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<CallbackResult>>>,
}

impl CallbackSlot {
    /// Deliver `result` if nothing was delivered before. Returns whether this
    /// call won.
    fn resolve(&self, result: CallbackResult) -> bool {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(tx) = sender {
            // Receiver gone means the flow already gave up; nothing to do.
            let _ = tx.send(result);
        }
        true
    }
}

/// A running loopback listener for one browser-delegated flow.
///
/// The bound port is released by [`LoopbackListener::stop`], or by `Drop` on
/// any path that forgets to call it.
pub struct LoopbackListener {
    redirect_uri: String,
    local_addr: SocketAddr,
    receiver: Option<oneshot::Receiver<CallbackResult>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackListener {
    /// Bind the host/port/path of `redirect_uri` and start serving.
    ///
    /// Fails fast with [`AuthError::ListenerUnavailable`] if the port is taken;
    /// the redirect URI is fixed by the app registration so there is nothing
    /// to fall back to. Port `0` binds an ephemeral port and
    /// [`LoopbackListener::redirect_uri`] then reports the actual one.
    pub async fn start(redirect_uri: &str) -> Result<Self> {
        let parsed = Url::parse(redirect_uri).map_err(|e| {
            AuthError::ListenerUnavailable(format!("invalid redirect URI {}: {}", redirect_uri, e))
        })?;

        if parsed.scheme() != "http" {
            return Err(AuthError::ListenerUnavailable(format!(
                "redirect URI must use http, got {}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| AuthError::ListenerUnavailable("redirect URI has no host".into()))?;
        let port = parsed.port_or_known_default().unwrap_or(80);
        let path = match parsed.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };

        let listener = TcpListener::bind(format!("{}:{}", host, port))
            .await
            .map_err(|e| {
                tracing::error!(host, port, error = %e, "Failed to bind OAuth callback listener");
                AuthError::ListenerUnavailable(format!("cannot bind {}:{}: {}", host, port, e))
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::ListenerUnavailable(format!("cannot read bound address: {}", e)))?;

        let redirect_uri = if parsed.port() == Some(0) {
            let mut actual = parsed.clone();
            actual
                .set_port(Some(local_addr.port()))
                .map_err(|_| AuthError::ListenerUnavailable("cannot set redirect port".into()))?;
            actual.to_string()
        } else {
            redirect_uri.to_string()
        };

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(CallbackSlot {
            resolved: AtomicBool::new(false),
            sender: Mutex::new(Some(tx)),
        });

        let app = callback_router(&path, slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %e, "OAuth callback listener error");
            }
        });

        tracing::info!(address = %local_addr, path = %path, "OAuth callback listener started");

        Ok(Self {
            redirect_uri,
            local_addr,
            receiver: Some(rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Redirect URI to use in the authorize request and token exchange.
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the first redirect, bounded by `timeout`.
    ///
    /// An `error` redirect still resolves the wait; interpreting it is up to
    /// the caller.
    pub async fn await_callback(&mut self, timeout: Duration) -> Result<CallbackResult> {
        let receiver = self.receiver.take().ok_or_else(|| {
            AuthError::ListenerUnavailable("callback already consumed".to_string())
        })?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::ListenerUnavailable(
                "callback listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "Timed out waiting for OAuth redirect");
                Err(AuthError::AuthorizationTimeout(timeout))
            }
        }
    }

    /// Shut the server down and release the port.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                tracing::debug!("Callback listener did not drain in time, aborting");
                handle.abort();
            }
        }

        tracing::debug!(address = %self.local_addr, "OAuth callback listener stopped");
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

fn callback_router(path: &str, slot: Arc<CallbackSlot>) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(slot)
        .layer(TraceLayer::new_for_http())
}

async fn handle_callback(
    State(slot): State<Arc<CallbackSlot>>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let result = CallbackResult::from_query(&params);
    let page = if result.is_error() {
        FAILURE_PAGE
    } else {
        SUCCESS_PAGE
    };

    if slot.resolve(result) {
        tracing::info!("OAuth redirect captured");
        Html(page)
    } else {
        tracing::debug!("Ignoring repeated OAuth redirect");
        Html(ALREADY_COMPLETED_PAGE)
    }
}
