use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub refresh_remember_ttl_secs: i64,
    pub verification_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub login_window_secs: i64,
    pub login_max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("auth.access_ttl_secs", 15 * 60)?
            .set_default("auth.refresh_ttl_secs", 7 * 24 * 3600)?
            .set_default("auth.refresh_remember_ttl_secs", 30 * 24 * 3600)?
            .set_default("auth.verification_ttl_secs", 3600)?
            .set_default("auth.sweep_interval_secs", 60)?
            .set_default("auth.login_window_secs", 60)?
            .set_default("auth.login_max_attempts", 10)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", true)?
            .set_default("cors.max_age", 3600)?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("environment", "test")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("auth.access_ttl_secs", 900)?
            .set_default("auth.refresh_ttl_secs", 3600)?
            .set_default("auth.refresh_remember_ttl_secs", 7200)?
            .set_default("auth.verification_ttl_secs", 600)?
            .set_default("auth.sweep_interval_secs", 1)?
            .set_default("auth.login_window_secs", 60)?
            .set_default("auth.login_max_attempts", 10)?
            .set_default("cors.enabled", false)?
            .set_default("cors.allow_any_origin", false)?
            .set_default("cors.max_age", 3600)?
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }
}
