// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Current-user provider.

use std::sync::{Arc, RwLock};

/// Who is signed in. Inserts attach this id as `user_id`.
pub trait SessionProvider: Send + Sync + 'static {
    fn current_user_id(&self) -> Option<String>;
}

/// Thread-safe holder updated by the auth layer on sign-in/sign-out.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    user_id: Arc<RwLock<Option<String>>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let session = Self::new();
        session.sign_in(user_id);
        session
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.set(Some(user_id.into()));
    }

    pub fn sign_out(&self) {
        self.set(None);
    }

    fn set(&self, value: Option<String>) {
        match self.user_id.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl SessionProvider for SharedSession {
    fn current_user_id(&self) -> Option<String> {
        match self.user_id.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
