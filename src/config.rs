//! Type-safe configuration loader using the `config` crate,
//! with manual environment-variable overrides for core settings.

use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::{env, time::Duration};

/// Top-level application settings loaded from `Config.toml`
/// and then overridden (where applicable) by environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Postgres connection URL
    pub database_url: String,

    /// HTTP bind address for the API, metrics & health endpoints
    pub server_bind: String,

    /// Upper bound on pooled Postgres connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Page size used when a request does not name one
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Requests asking for more rows per page are clamped to this
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Refuse CSV exports larger than this many rows; unset means unbounded
    #[serde(default)]
    pub export_row_cap: Option<u64>,

    /// Lifetime of a login session (e.g. "8h", "30m")
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub session_ttl: Duration,

    /// Accounts allowed to log in.
    #[serde(default)]
    pub users: Vec<UserCredential>,
}

/// One account able to open a session.
#[derive(Deserialize, Clone)]
pub struct UserCredential {
    pub username: String,

    /// Lowercase hex SHA-256 of the password
    pub password_sha256: String,
}

impl std::fmt::Debug for UserCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredential")
            .field("username", &self.username)
            .field("password_sha256", &"<redacted>")
            .finish()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    500
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(8 * 60 * 60)
}

impl Settings {
    /// Load settings from `Config.toml` (if present),
    /// then apply any overrides from these environment variables:
    ///
    /// - `APP__DATABASE_URL`
    /// - `APP__SERVER_BIND`
    /// - `APP__EXPORT_ROW_CAP`
    /// - `APP__SESSION_TTL`
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config")
    }

    /// Same as [`Settings::new`] but reading the named config file.
    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        // 1) Base defaults from the config file
        let cfg = Config::builder()
            .add_source(File::with_name(name).required(false))
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;

        // 2) Manual overrides for core settings
        if let Ok(val) = env::var("APP__DATABASE_URL") {
            settings.database_url = val;
        }
        if let Ok(val) = env::var("APP__SERVER_BIND") {
            settings.server_bind = val;
        }
        if let Ok(val) = env::var("APP__EXPORT_ROW_CAP") {
            settings.export_row_cap = if val.trim().is_empty() {
                None
            } else {
                Some(val.trim().parse().map_err(|e| ConfigError::Foreign(Box::new(e)))?)
            };
        }
        if let Ok(val) = env::var("APP__SESSION_TTL") {
            settings.session_ttl =
                humantime::parse_duration(&val).map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(ConfigError::Message(
                "default_page_size and max_page_size must be positive".into(),
            ));
        }
        if self.default_page_size > self.max_page_size {
            return Err(ConfigError::Message(
                "default_page_size must not exceed max_page_size".into(),
            ));
        }
        Ok(())
    }

    /// Page size for a request: the default when absent, clamped to the maximum.
    pub fn effective_page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> (std::path::PathBuf, String) {
        let dir = env::temp_dir().join(format!(
            "output_viewer_cfg_{}_{}",
            std::process::id(),
            body.len()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Config.toml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(body.as_bytes())
            .unwrap();
        let name = dir.join("Config").to_string_lossy().into_owned();
        (path, name)
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let (path, name) = write_config(
            r#"
            database_url = "postgres://localhost/market"
            server_bind = "127.0.0.1:8080"
            "#,
        );

        let settings = Settings::from_file(&name).unwrap();

        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.default_page_size, 50);
        assert_eq!(settings.max_page_size, 500);
        assert_eq!(settings.session_ttl, Duration::from_secs(8 * 3600));
        assert!(settings.users.is_empty());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn users_and_durations_are_parsed() {
        let (path, name) = write_config(
            r#"
            database_url = "postgres://localhost/market"
            server_bind = "0.0.0.0:9000"
            default_page_size = 20
            max_page_size = 100
            session_ttl = "30m"

            [[users]]
            username = "analyst"
            password_sha256 = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            "#,
        );

        let settings = Settings::from_file(&name).unwrap();

        assert_eq!(settings.session_ttl, Duration::from_secs(30 * 60));
        assert_eq!(settings.users.len(), 1);
        assert_eq!(settings.users[0].username, "analyst");
        assert_eq!(settings.effective_page_size(None), 20);
        assert_eq!(settings.effective_page_size(Some(1000)), 100);
        assert!(!format!("{settings:?}").contains("ba7816bf"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn inconsistent_page_sizes_are_rejected() {
        let (path, name) = write_config(
            r#"
            database_url = "postgres://localhost/market"
            server_bind = "127.0.0.1:8080"
            default_page_size = 600
            max_page_size = 100
            "#,
        );

        assert!(Settings::from_file(&name).is_err());
        std::fs::remove_file(path).ok();
    }
}
