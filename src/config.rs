//! Configuration loading (§6.4, SPEC_FULL §10.3).
//!
//! Layered: built-in defaults → optional file (`ALN_CONFIG`, default
//! `config/default.toml`) → environment variables prefixed `ALN_` (double
//! underscore separates nesting, e.g. `ALN_VLC__HOST`). Failure to
//! assemble a valid config is fatal at startup, matching the Token
//! Catalog's fail-fast policy.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VlcConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Default for VlcConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8080,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Either a bcrypt hash (detected by the `$2` prefix) or a plaintext
    /// password hashed once at load time.
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: "changeme".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timeout_ms: u64,
    pub max_devices: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 14_400_000,
            max_devices: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineQueueConfig {
    pub max_batch_age_ms: u64,
    pub cache_size: u64,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            max_batch_age_ms: 3_600_000,
            cache_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub jwt_secret: String,
    pub vlc: VlcConfig,
    pub admin: AdminConfig,
    pub session: SessionConfig,
    pub offline_queue: OfflineQueueConfig,
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            data_dir: "./data".into(),
            jwt_secret: "aln-orchestrator-dev-secret".into(),
            vlc: VlcConfig::default(),
            admin: AdminConfig::default(),
            session: SessionConfig::default(),
            offline_queue: OfflineQueueConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

impl Config {
    /// Load layered configuration. `explicit_path`, if given, takes
    /// priority over the `ALN_CONFIG` environment variable.
    pub fn load(explicit_path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("port", 3000)?
            .set_default("data_dir", "./data")?
            .set_default("jwt_secret", "aln-orchestrator-dev-secret")?
            .set_default("vlc.host", "localhost")?
            .set_default("vlc.port", 8080)?
            .set_default("vlc.password", "")?
            .set_default("admin.password", "changeme")?
            .set_default("session.timeout_ms", 14_400_000_i64)?
            .set_default("session.max_devices", 15)?
            .set_default("offline_queue.max_batch_age_ms", 3_600_000_i64)?
            .set_default("offline_queue.cache_size", 100)?
            .set_default("cors.origins", Vec::<String>::new())?;

        let file_path = explicit_path
            .map(str::to_string)
            .or_else(|| std::env::var("ALN_CONFIG").ok());

        if let Some(path) = file_path {
            if Path::new(&path).exists() {
                builder = builder.add_source(config::File::with_name(&path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ALN")
                .separator("__")
                .try_parsing(true),
        );

        let raw: Config = builder.build()?.try_deserialize()?;
        Ok(raw)
    }

    pub fn session_path(&self, session_id: &str) -> String {
        format!("session:{session_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.session.timeout_ms, 14_400_000);
        assert_eq!(cfg.offline_queue.cache_size, 100);
    }

    #[test]
    fn env_override_wins() {
        std::env::set_var("ALN_PORT", "4100");
        let cfg = Config::load(None).unwrap();
        assert_eq!(cfg.port, 4100);
        std::env::remove_var("ALN_PORT");
    }
}
