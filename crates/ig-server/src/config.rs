//! TOML-backed runtime configuration.
//!
//! Token fields are mutable at runtime: after a refresh or regeneration the
//! Graph client persists the new token through `TokenStore`, which rewrites
//! the config file so the next process start picks up the newest pair.

use ig_graph::{GraphError, TokenContext, TokenStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub account_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_oauth_url")]
    pub oauth_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub access_token: String,
    pub long_lived_token: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_addr")]
    pub addr: String,
}

fn default_base_url() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_oauth_url() -> String {
    "https://graph.facebook.com/v21.0/oauth/access_token".to_string()
}

fn default_db_path() -> String {
    "./data/insights.db".to_string()
}

fn default_addr() -> String {
    "127.0.0.1:8870".to_string()
}

pub struct ConfigStore {
    path: PathBuf,
    inner: RwLock<ServerConfig>,
}

impl ConfigStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)?;
        let config: ServerConfig = toml::from_str(&text)?;
        Ok(Self {
            path,
            inner: RwLock::new(config),
        })
    }

    pub fn snapshot(&self) -> ServerConfig {
        self.inner.read().unwrap().clone()
    }

    pub fn token_context(&self) -> TokenContext {
        let config = self.inner.read().unwrap();
        TokenContext {
            access_token: config.access_token.clone(),
            long_lived_token: config.long_lived_token.clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut ServerConfig)) -> Result<(), ConfigError> {
        let mut config = self.inner.write().unwrap();
        apply(&mut config);
        let text = toml::to_string_pretty(&*config)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl TokenStore for ConfigStore {
    fn persist_access_token(&self, token: &str) -> Result<(), GraphError> {
        self.update(|config| config.access_token = token.to_string())
            .map_err(|err| GraphError::Persist(err.to_string()))
    }

    fn persist_long_lived_token(&self, token: &str) -> Result<(), GraphError> {
        self.update(|config| config.long_lived_token = token.to_string())
            .map_err(|err| GraphError::Persist(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp config");
        write!(
            file,
            r#"
account_id = "17841400000000000"
app_id = "app"
app_secret = "secret"
access_token = "short"
long_lived_token = "long"
"#
        )
        .expect("write config");
        file
    }

    #[test]
    fn load_applies_defaults_for_optional_fields() {
        let file = sample_file();
        let store = ConfigStore::load(file.path()).expect("load");
        let config = store.snapshot();
        assert_eq!(config.account_id, "17841400000000000");
        assert_eq!(config.base_url, "https://graph.facebook.com/v21.0");
        assert_eq!(config.addr, "127.0.0.1:8870");
    }

    #[test]
    fn persisted_tokens_survive_a_reload() {
        let file = sample_file();
        let store = ConfigStore::load(file.path()).expect("load");
        store
            .persist_access_token("fresh-short")
            .expect("persist access");
        store
            .persist_long_lived_token("fresh-long")
            .expect("persist long");

        let reloaded = ConfigStore::load(file.path()).expect("reload");
        let context = reloaded.token_context();
        assert_eq!(context.access_token, "fresh-short");
        assert_eq!(context.long_lived_token, "fresh-long");
        // Non-token fields are untouched by the rewrite.
        assert_eq!(reloaded.snapshot().app_secret, "secret");
    }
}
