// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory holder of the signed-in user.

use std::sync::{Arc, RwLock};

use crate::models::UserProfile;

/// The current Firebase session, replaced wholesale on sign-in/sign-out.
#[derive(Debug, Default)]
pub struct Session {
    current: RwLock<Option<Arc<UserProfile>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<UserProfile>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, profile: UserProfile) -> Arc<UserProfile> {
        let profile = Arc::new(profile);
        self.replace(Some(profile.clone()));
        profile
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, value: Option<Arc<UserProfile>>) {
        match self.current.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}
