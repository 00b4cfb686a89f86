// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Browser-delegated authorization request/response types.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Which browser-delegated flow a request belongs to.
///
/// Only one request of each kind may be outstanding, because each kind owns a
/// fixed loopback port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Microsoft sign-in bridged into a Firebase session.
    MicrosoftSignIn,
    /// Direct Graph mailbox connection.
    OutlookConnect,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::MicrosoftSignIn => f.write_str("microsoft_sign_in"),
            FlowKind::OutlookConnect => f.write_str("outlook_connect"),
        }
    }
}

/// Secrets generated for one in-flight browser-delegated flow.
#[derive(Debug, Clone)]
pub struct PendingAuthorizationRequest {
    pub state: String,
    pub code_verifier: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// Parsed query string of the provider redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackResult {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackResult {
    /// Build from decoded query parameters.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        Self {
            code: params.get("code").cloned(),
            state: params.get("state").cloned(),
            error: params.get("error").cloned(),
            error_description: params.get("error_description").cloned(),
        }
    }

    /// True when the provider redirected with an `error` parameter.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
