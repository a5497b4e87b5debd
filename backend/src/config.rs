use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

/// Connection details for the hosted auth provider.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub url: String,
    pub anon_key: String,
    /// Enables the admin API (user verification, email auto-confirm).
    pub service_role_key: Option<String>,
    /// Upper bound on a single request to the provider.
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignupConfig {
    #[serde(default = "default_max_profile_attempts")]
    pub max_profile_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_commit_wait_ms")]
    pub commit_wait_ms: u64,
}

impl SignupConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn commit_wait(&self) -> Duration {
        Duration::from_millis(self.commit_wait_ms)
    }
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            max_profile_attempts: default_max_profile_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            commit_wait_ms: default_commit_wait_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default)]
    pub run_migrations: bool,
    pub server_addr: String,
    pub frontend_url: Option<String>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub signup: SignupConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("APP_CONFIG").unwrap_or_else(|_| "config".to_string());

        let s = Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::default().separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_auth_timeout_secs() -> u64 {
    10
}

fn default_max_profile_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_commit_wait_ms() -> u64 {
    500
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;

    #[test]
    fn fills_defaults_for_optional_sections() {
        let cfg: AppConfig = Config::builder()
            .add_source(File::from_str(
                r#"
                database_url = "postgres://localhost/social"
                server_addr = "127.0.0.1:3000"

                [auth]
                url = "http://localhost:54321"
                anon_key = "anon"
                "#,
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(!cfg.run_migrations);
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.signup.max_profile_attempts, 5);
        assert_eq!(cfg.signup.base_backoff(), Duration::from_secs(1));
        assert_eq!(cfg.signup.commit_wait(), Duration::from_millis(500));
        assert!(cfg.auth.service_role_key.is_none());
        assert_eq!(cfg.auth.timeout(), Duration::from_secs(10));
        assert!(cfg.frontend_url.is_none());
    }
}
