use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Caché de audio
    pub cache_dir: PathBuf,
    pub cache_limit_mb: u64,
    pub max_cache_duration: u64, // En segundos
    pub download_timeout: u64,   // En segundos

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Paths
    pub data_dir: PathBuf,

    // Límites
    pub idle_timeout: u64, // Segundos sin reproducir antes de desconectar
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Caché de audio
            cache_dir: std::env::var("CACHE_DIR")
                .unwrap_or_else(|_| "./cache".to_string())
                .into(),
            cache_limit_mb: std::env::var("CACHE_LIMIT_MB")
                .unwrap_or_else(|_| "2048".to_string())
                .parse()?,
            max_cache_duration: std::env::var("MAX_CACHE_DURATION")
                .unwrap_or_else(|_| "1800".to_string()) // 30 minutos
                .parse()?,
            download_timeout: std::env::var("DOWNLOAD_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            // Límites
            idle_timeout: std::env::var("IDLE_TIMEOUT")
                .unwrap_or_else(|_| "180".to_string())
                .parse()?,
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.cache_dir)?;
        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Cache limit and max cacheable duration must be greater than zero
    /// - Queue size and timeouts must be greater than zero
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 1.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.cache_limit_mb == 0 {
            anyhow::bail!("Cache limit must be greater than 0 MB");
        }

        if self.max_cache_duration == 0 {
            anyhow::bail!("Max cacheable duration must be greater than 0 seconds");
        }

        if self.download_timeout == 0 {
            anyhow::bail!("Download timeout must be greater than 0 seconds");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.idle_timeout == 0 {
            anyhow::bail!("Idle timeout must be greater than 0 seconds");
        }

        Ok(())
    }

    /// Maximum cache size in bytes, derived from `cache_limit_mb`.
    pub fn cache_limit_bytes(&self) -> u64 {
        self.cache_limit_mb * 1024 * 1024
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like tokens.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Cache: {} ({} MB max, tracks <= {}s, download timeout {}s)\n  \
            Audio: {}% vol, {} queue max\n  \
            Idle: disconnect after {}s",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.cache_dir.display(),
            self.cache_limit_mb,
            self.max_cache_duration,
            self.download_timeout,
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.idle_timeout
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Cache defaults
            cache_dir: "./cache".into(),
            cache_limit_mb: 2048,     // 2 GiB
            max_cache_duration: 1800, // 30 minutes
            download_timeout: 300,    // 5 minutes

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 1000,

            // Path defaults
            data_dir: "./data".into(),

            // Limit defaults
            idle_timeout: 180, // 3 minutes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_limit_bytes() {
        let config = Config {
            cache_limit_mb: 2048,
            ..Default::default()
        };
        assert_eq!(config.cache_limit_bytes(), 2048 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_out_of_range_volume() {
        let config = Config {
            default_volume: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_cache_limit() {
        let config = Config {
            cache_limit_mb: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
