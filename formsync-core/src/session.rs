//! Application session: who is signed in, their tokens, and UI preferences.
//!
//! The session is built once at startup and handed to whatever needs it
//! (the API client, key selectors that depend on the current user). Its
//! state lives in a [`Signal`], so reading it inside an effect makes that
//! effect follow sign-in and sign-out.
//!
//! Persistence is explicit: [`Session::load`] at startup, [`Session::save`]
//! after sign-in, sign-out or a preference change. The snapshot is stored as
//! MessagePack.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{Role, TokenPair, UserProfile};
use crate::reactive::{ReadSignal, Signal};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Everything the session persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user: Option<UserProfile>,
    pub tokens: Option<TokenPair>,
    pub theme: Theme,
    pub language: String,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            user: None,
            tokens: None,
            theme: Theme::default(),
            language: "en".into(),
        }
    }
}

/// Shared handle on the session; clones see the same state.
#[derive(Debug, Clone)]
pub struct Session {
    state: Signal<SessionSnapshot>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionSnapshot::default())
    }
}

impl Session {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            state: Signal::new(snapshot),
        }
    }

    /// Restore from `path`; a missing file yields a fresh session.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => {
                let snapshot: SessionSnapshot = rmp_serde::from_slice(&bytes)?;
                debug!(path = %path.display(), signed_in = snapshot.user.is_some(), "session loaded");
                Ok(Self::new(snapshot))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Write the current snapshot to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.state.with_untracked(rmp_serde::to_vec_named)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        debug!(path = %path.display(), "session saved");
        Ok(())
    }

    /// Current snapshot; tracked inside effects.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.get()
    }

    pub fn watch(&self) -> ReadSignal<SessionSnapshot> {
        self.state.read_only()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.state.with(|s| s.user.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.with(|s| s.user.is_some())
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .with(|s| s.user.as_ref().is_some_and(|u| u.role == Role::Admin))
    }

    /// Tokens for the next request; read without tracking.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.state.with_untracked(|s| s.tokens.clone())
    }

    pub fn sign_in(&self, user: UserProfile, tokens: TokenPair) {
        debug!(user_id = user.id, "signed in");
        self.state.modify(|s| {
            s.user = Some(user);
            s.tokens = Some(tokens);
            true
        });
    }

    /// Forget the user and tokens; preferences stay.
    pub fn sign_out(&self) {
        debug!("signed out");
        self.state.modify(|s| {
            s.user = None;
            s.tokens = None;
            true
        });
    }

    pub fn set_tokens(&self, tokens: TokenPair) {
        self.state.modify(|s| {
            s.tokens = Some(tokens);
            true
        });
    }

    pub fn set_user(&self, user: UserProfile) {
        self.state.modify(|s| {
            s.user = Some(user);
            true
        });
    }

    pub fn set_theme(&self, theme: Theme) {
        self.state.modify(|s| {
            let changed = s.theme != theme;
            s.theme = theme;
            changed
        });
    }

    pub fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        self.state.modify(|s| {
            let changed = s.language != language;
            s.language = language;
            changed
        });
    }
}
