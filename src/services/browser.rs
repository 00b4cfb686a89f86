// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Opening the provider authorize page in the user's browser.

use std::process::{Command, Stdio};

use crate::error::{AuthError, Result};

/// Something that can show a URL to the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Default browser of the desktop session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        match open::that_detached(url) {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Desktop browser launch failed, trying OS command");
            }
        }

        let (program, args) = fallback_command(url);
        Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(program, error = %e, "No way to open a browser");
                AuthError::Browser(format!("{} failed: {}", program, e))
            })
    }
}

fn fallback_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        (
            "cmd",
            vec!["/c".into(), "start".into(), String::new(), url.to_string()],
        )
    } else if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}
