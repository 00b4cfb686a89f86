// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the authentication core.

pub mod callback;
pub mod mail;
pub mod token;
pub mod user;

pub use callback::{CallbackResult, FlowKind, PendingAuthorizationRequest};
pub use mail::{AttachmentInfo, ItemBody, MailMessage, MailSummary, Recipient};
pub use token::{MicrosoftToken, ProviderTokens};
pub use user::UserProfile;
