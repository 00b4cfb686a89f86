// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - identity flows and their building blocks.

pub mod auth;
pub mod browser;
pub mod firebase;
pub mod graph;
pub mod loopback;
pub mod microsoft;
pub mod pkce;
pub mod session;
pub mod token_store;

pub use auth::AuthService;
pub use browser::{BrowserLauncher, SystemBrowser};
pub use firebase::{FirebaseIdentityClient, IdpCredentials};
pub use graph::GraphMailClient;
pub use loopback::LoopbackListener;
pub use microsoft::{AuthorizeParams, MicrosoftIdentityClient};
pub use session::Session;
pub use token_store::TokenStore;
