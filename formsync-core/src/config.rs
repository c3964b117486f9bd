//! Client configuration.
//!
//! Defaults suit a local development server. Every field can be overridden
//! from the environment:
//!
//! | variable                 | field             |
//! |--------------------------|-------------------|
//! | `FORMSYNC_BASE_URL`      | `base_url`        |
//! | `FORMSYNC_API_PREFIX`    | `api_prefix`      |
//! | `FORMSYNC_HUB_PATH`      | `hub_path`        |
//! | `FORMSYNC_SESSION_PATH`  | `session_path`    |
//! | `FORMSYNC_TIMEOUT_SECS`  | `request_timeout` |

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub hub_path: String,
    pub session_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".into(),
            api_prefix: "/api".into(),
            hub_path: "/hubs/comments".into(),
            session_path: PathBuf::from("formsync-session.mpk"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `FORMSYNC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok());
        config
    }

    /// Apply overrides from any name → value lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FORMSYNC_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("FORMSYNC_API_PREFIX") {
            self.api_prefix = v;
        }
        if let Some(v) = lookup("FORMSYNC_HUB_PATH") {
            self.hub_path = v;
        }
        if let Some(v) = lookup("FORMSYNC_SESSION_PATH") {
            self.session_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FORMSYNC_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(secs) => self.request_timeout = Duration::from_secs(secs),
                Err(_) => warn!(value = %v, "ignoring invalid FORMSYNC_TIMEOUT_SECS"),
            }
        }
    }

    /// Base of every REST path, e.g. `http://localhost:5000/api`.
    pub fn api_base(&self) -> String {
        let prefix = self.api_prefix.trim_matches('/');
        let base = self.base_url.trim_end_matches('/');
        if prefix.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{prefix}")
        }
    }

    /// Websocket URL of the comment hub.
    pub fn hub_url(&self) -> Result<String> {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got {base}"
            )));
        };
        Ok(format!("{ws_base}/{}", self.hub_path.trim_start_matches('/')))
    }
}
