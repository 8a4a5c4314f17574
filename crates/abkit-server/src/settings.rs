//! Runtime server configuration.
//!
//! Read from a TOML file and `ABKIT_*` environment variables; every key has a
//! default so an empty environment still yields a working local server.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use abkit_api::VisitorCookie;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub store_path:      PathBuf,
  pub busy_timeout_ms: u64,
  pub cookie_name:     String,
  pub cookie_days:     u32,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:            "127.0.0.1".to_string(),
      port:            8080,
      store_path:      PathBuf::from("abkit.sqlite"),
      busy_timeout_ms: 5000,
      cookie_name:     abkit_api::visitor::DEFAULT_COOKIE_NAME.to_string(),
      cookie_days:     abkit_api::visitor::DEFAULT_COOKIE_DAYS,
    }
  }
}

impl ServerConfig {
  /// Layer `file` (optional) and `ABKIT_*` variables over the defaults.
  pub fn load(file: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("ABKIT"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

  pub fn visitor_cookie(&self) -> VisitorCookie {
    VisitorCookie {
      name:     self.cookie_name.clone(),
      max_days: self.cookie_days,
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
