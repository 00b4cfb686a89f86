// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Safety margin before wire-level expiry when a token counts as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Tokens returned by an authorization-code exchange.
///
/// At least one of `id_token` / `access_token` is present whenever this value
/// comes out of a successful exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderTokens {
    pub id_token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Provider-declared lifetime of the access token, in seconds.
    pub expires_in: Option<i64>,
}

/// Durable Microsoft Graph credential (the Outlook token silo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MicrosoftToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Issuance time plus the provider-declared lifetime.
    #[serde(with = "crate::time_utils::rfc3339")]
    pub expires_at: DateTime<Utc>,
}

impl MicrosoftToken {
    /// Create a token record issued at `issued_at` that lives `expires_in_secs`.
    ///
    /// Returns `None` when the deadline is outside the representable range.
    pub fn try_issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Option<Self> {
        let expires_at = issued_at.checked_add_signed(Duration::try_seconds(expires_in_secs)?)?;
        Some(Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        })
    }

    /// Like [`MicrosoftToken::try_issued`], saturating an out-of-range
    /// deadline instead of failing.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
    ) -> Self {
        let expires_at = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(if expires_in_secs < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });

        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Expired once `now >= expires_at - 60s`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self
            .expires_at
            .checked_sub_signed(Duration::seconds(EXPIRY_MARGIN_SECS))
        {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
