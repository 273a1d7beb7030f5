use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub max_body_bytes: usize,
    pub session_idle_secs: u64,
    pub max_sessions: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/ghostnets.db".into(),
            max_body_bytes: 64 * 1024,
            session_idle_secs: 30 * 60,
            max_sessions: 10_000,
        }
    }
}

/// Defaults, then `server.toml` if present, then the environment.
/// `APP__*` variables win over the older `SERVER_BIND` / `DATABASE_URL`.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let defaults = Settings::default();
    Config::builder()
        .set_default("bind_addr", defaults.bind_addr)?
        .set_default("database_url", defaults.database_url)?
        .set_default("max_body_bytes", defaults.max_body_bytes as u64)?
        .set_default("session_idle_secs", defaults.session_idle_secs)?
        .set_default("max_sessions", defaults.max_sessions as u64)?
        .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml).required(false))
        .set_override_option("bind_addr", legacy_env("SERVER_BIND", "APP__BIND_ADDR"))?
        .set_override_option(
            "database_url",
            legacy_env("DATABASE_URL", "APP__DATABASE_URL"),
        )?
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

fn legacy_env(legacy: &str, preferred: &str) -> Option<String> {
    if std::env::var_os(preferred).is_some() {
        return None;
    }
    std::env::var(legacy).ok()
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    format!("sqlite://{path}")
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
