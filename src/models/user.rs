// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed-in user profile.

use serde::{Deserialize, Serialize};

/// Profile of the user holding the current Firebase session.
///
/// `uid` and `email` are always present; the remaining fields depend on what
/// the identity provider shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Firebase user id (`localId`)
    pub uid: String,
    /// Display name, if the account has one
    pub display_name: Option<String>,
    /// Email address
    pub email: String,
    /// Avatar URL
    pub avatar_uri: Option<String>,
}

impl UserProfile {
    /// Build a profile, dropping blank optional fields.
    pub fn new(
        uid: impl Into<String>,
        email: impl Into<String>,
        display_name: Option<String>,
        avatar_uri: Option<String>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: non_blank(display_name),
            avatar_uri: non_blank(avatar_uri),
        }
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
