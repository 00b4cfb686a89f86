// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! To-do Desktop authentication core
//!
//! Email/password sign-in against Firebase, Microsoft sign-in federated into
//! Firebase, and a separately persisted Microsoft Graph token for the Outlook
//! mailbox. Browser-delegated flows use PKCE and a loopback redirect listener.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod time_utils;

pub use config::Config;
pub use error::{AuthError, Result};
pub use services::{AuthService, GraphMailClient};
