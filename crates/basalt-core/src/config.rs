//! Core configuration. Loaded only from a path the caller supplies —
//! never discovered via an environment variable or `$HOME`, per the
//! "no environment variables are consulted" guarantee.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasaltConfig {
    pub worker_pool_max_threads: Option<usize>,
    pub rng_pool_hash: String,
    pub default_kdf: String,
    pub default_cascade: String,
    pub shim_backend: String,
}

impl Default for BasaltConfig {
    fn default() -> BasaltConfig {
        BasaltConfig {
            worker_pool_max_threads: None,
            rng_pool_hash: "SHA-512".to_string(),
            default_kdf: "Argon2id".to_string(),
            default_cascade: "AES".to_string(),
            shim_backend: default_shim_backend().to_string(),
        }
    }
}

fn default_shim_backend() -> &'static str {
    "loopback-file"
}

impl BasaltConfig {
    pub fn load(path: &Path) -> Result<BasaltConfig> {
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::SystemException { subject: path.display().to_string(), source: e })?;
        toml::from_str(&text).map_err(|e| CoreError::ParameterIncorrect(format!("invalid config at {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = BasaltConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: BasaltConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.rng_pool_hash, config.rng_pool_hash);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let parsed: BasaltConfig = toml::from_str("default_kdf = \"PBKDF2-HMAC-SHA-512\"\n").unwrap();
        assert_eq!(parsed.default_kdf, "PBKDF2-HMAC-SHA-512");
        assert_eq!(parsed.default_cascade, "AES");
    }
}
