use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub backend: BackendConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Listen address for `rollcall serve`
  #[serde(default = "default_bind")]
  pub bind: String,
  /// Public base URL of the service (NEXT_PUBLIC_BASE_URL)
  pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: default_bind(),
      public_base_url: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Upstream REST API base (BACKEND_API_URL). Left unset on purpose: routes
  /// report the missing variable per request instead of refusing to start.
  pub url: Option<String>,
  /// Server-side token used when the caller has no session cookie
  pub api_token: Option<String>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      url: None,
      api_token: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// B2 account authorization endpoint
  #[serde(default = "default_b2_auth_url")]
  pub auth_url: String,
  #[serde(default)]
  pub students: BucketConfig,
  #[serde(default)]
  pub parents: BucketConfig,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      auth_url: default_b2_auth_url(),
      students: BucketConfig::default(),
      parents: BucketConfig::default(),
    }
  }
}

/// Credentials and target bucket for one picture store.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct BucketConfig {
  #[serde(default)]
  pub account_id: String,
  #[serde(default)]
  pub application_key: String,
  #[serde(default)]
  pub bucket_id: String,
  #[serde(default)]
  pub bucket_name: String,
}

impl BucketConfig {
  /// Names of the settings that are still empty.
  pub fn missing_fields(&self) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if self.account_id.is_empty() {
      missing.push("account_id");
    }
    if self.application_key.is_empty() {
      missing.push("application_key");
    }
    if self.bucket_id.is_empty() {
      missing.push("bucket_id");
    }
    if self.bucket_name.is_empty() {
      missing.push("bucket_name");
    }
    missing
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
  /// Base URL of the own API, including the `/api` prefix (NEXT_PUBLIC_API_URL)
  pub api_url: Option<String>,
  #[serde(default = "default_dashboard_refresh_secs")]
  pub dashboard_refresh_secs: u64,
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  #[serde(default = "default_dedupe_secs")]
  pub dedupe_secs: u64,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      api_url: None,
      dashboard_refresh_secs: default_dashboard_refresh_secs(),
      stale_secs: default_stale_secs(),
      dedupe_secs: default_dedupe_secs(),
    }
  }
}

fn default_bind() -> String {
  "127.0.0.1:3000".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_b2_auth_url() -> String {
  "https://api.backblazeb2.com".to_string()
}

fn default_dashboard_refresh_secs() -> u64 {
  30
}

fn default_stale_secs() -> u64 {
  60
}

fn default_dedupe_secs() -> u64 {
  2
}

impl Config {
  /// Load configuration from file and environment.
  ///
  /// Search order for the file:
  /// 1. Explicit path if provided
  /// 2. ./rollcall.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rollcall/config.yaml
  ///
  /// The file is optional. Environment variables (and a `.env` file, if
  /// present) override whatever the file sets.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    dotenvy::dotenv().ok();

    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("rollcall.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rollcall").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Overlay environment variables onto the loaded configuration.
  ///
  /// `lookup` abstracts `std::env::var` so tests don't have to touch the
  /// process environment. Empty values count as unset.
  pub fn apply_env<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("ROLLCALL_BIND") {
      self.server.bind = v;
    }
    if let Some(v) = get("NEXT_PUBLIC_BASE_URL") {
      self.server.public_base_url = Some(v);
    }
    if let Some(v) = get("BACKEND_API_URL") {
      self.backend.url = Some(v);
    }
    if let Some(v) = get("API_TOKEN") {
      self.backend.api_token = Some(v);
    }
    if let Some(v) = get("NEXT_PUBLIC_API_URL") {
      self.client.api_url = Some(v);
    }

    overlay_bucket(&mut self.storage.students, "B2_", &get);
    overlay_bucket(&mut self.storage.parents, "PARENTS_B2_", &get);
  }

  /// Upstream base URL without a trailing slash, if configured.
  pub fn backend_url(&self) -> Option<&str> {
    self
      .backend
      .url
      .as_deref()
      .map(|u| u.trim_end_matches('/'))
      .filter(|u| !u.is_empty())
  }

  /// Base URL the dashboard client talks to.
  pub fn api_base_url(&self) -> String {
    if let Some(url) = &self.client.api_url {
      return url.trim_end_matches('/').to_string();
    }
    if let Some(base) = &self.server.public_base_url {
      return format!("{}/api", base.trim_end_matches('/'));
    }
    format!("http://{}/api", self.server.bind)
  }

  pub fn backend_timeout(&self) -> Duration {
    Duration::from_secs(self.backend.timeout_secs)
  }
}

fn overlay_bucket<F>(bucket: &mut BucketConfig, prefix: &str, get: &F)
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(v) = get(&format!("{}ACCOUNT_ID", prefix)) {
    bucket.account_id = v;
  }
  if let Some(v) = get(&format!("{}APPLICATION_KEY", prefix)) {
    bucket.application_key = v;
  }
  if let Some(v) = get(&format!("{}BUCKET_ID", prefix)) {
    bucket.bucket_id = v;
  }
  if let Some(v) = get(&format!("{}BUCKET_NAME", prefix)) {
    bucket.bucket_name = v;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |key| map.get(key).cloned()
  }

  #[test]
  fn test_defaults_without_file() {
    let config = Config::default();
    assert_eq!(config.server.bind, "127.0.0.1:3000");
    assert_eq!(config.backend_url(), None);
    assert_eq!(config.client.dashboard_refresh_secs, 30);
    assert_eq!(config.api_base_url(), "http://127.0.0.1:3000/api");
  }

  #[test]
  fn test_env_overrides_file() {
    let mut config = Config::from_yaml(
      "backend:\n  url: http://file.example/\nserver:\n  bind: 0.0.0.0:8080\n",
    )
    .unwrap();
    assert_eq!(config.backend_url(), Some("http://file.example"));

    config.apply_env(env(&[
      ("BACKEND_API_URL", "http://env.example/v1/"),
      ("API_TOKEN", "secret"),
    ]));
    assert_eq!(config.backend_url(), Some("http://env.example/v1"));
    assert_eq!(config.backend.api_token.as_deref(), Some("secret"));
    assert_eq!(config.server.bind, "0.0.0.0:8080");
  }

  #[test]
  fn test_empty_env_value_is_ignored() {
    let mut config = Config::default();
    config.apply_env(env(&[("BACKEND_API_URL", "  ")]));
    assert_eq!(config.backend_url(), None);
  }

  #[test]
  fn test_bucket_env_prefixes() {
    let mut config = Config::default();
    config.apply_env(env(&[
      ("B2_ACCOUNT_ID", "acc"),
      ("B2_APPLICATION_KEY", "key"),
      ("B2_BUCKET_ID", "bid"),
      ("B2_BUCKET_NAME", "students-pics"),
      ("PARENTS_B2_BUCKET_NAME", "parents-pics"),
    ]));

    assert!(config.storage.students.missing_fields().is_empty());
    assert_eq!(config.storage.parents.bucket_name, "parents-pics");
    assert_eq!(
      config.storage.parents.missing_fields(),
      vec!["account_id", "application_key", "bucket_id"]
    );
  }

  #[test]
  fn test_api_base_url_resolution() {
    let mut config = Config::default();
    config.apply_env(env(&[("NEXT_PUBLIC_BASE_URL", "https://school.example/")]));
    assert_eq!(config.api_base_url(), "https://school.example/api");

    config.apply_env(env(&[("NEXT_PUBLIC_API_URL", "https://api.school.example/api/")]));
    assert_eq!(config.api_base_url(), "https://api.school.example/api");
  }
}
