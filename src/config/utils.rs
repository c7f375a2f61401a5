use super::schemas::Config;
use crate::core::{PreviewError, PreviewResult};
use crate::logger::{self, LogTag};
use std::path::Path;

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from a TOML file, falling back to defaults when the
/// file does not exist. The result is validated before it is returned.
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> PreviewResult<Config> {
    let path = path.as_ref();
    let config = if path.exists() {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PreviewError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        parse_config(&contents)?
    } else {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path.display()),
        );
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

pub fn load_config() -> PreviewResult<Config> {
    load_config_from_path(CONFIG_FILE_PATH)
}

pub fn parse_config(contents: &str) -> PreviewResult<Config> {
    let config = toml::from_str::<Config>(contents)?;
    Ok(config)
}

impl Config {
    /// Reject budgets that would make the freshness layers contradict each other
    pub fn validate(&self) -> PreviewResult<()> {
        let f = &self.freshness;
        let budgets = [
            ("project_config", f.project_config_fresh_secs, f.project_config_stale_secs),
            ("global_state", f.global_state_fresh_secs, f.global_state_stale_secs),
            ("user_claim", f.user_claim_fresh_secs, f.user_claim_stale_secs),
        ];
        for (name, fresh, stale) in budgets {
            if fresh > stale {
                return Err(PreviewError::Config(format!(
                    "{}: fresh window ({}s) exceeds stale window ({}s)",
                    name, fresh, stale
                )));
            }
        }

        if !f.user_claim_public && f.user_claim_stale_secs != f.user_claim_fresh_secs {
            return Err(PreviewError::Config(
                "user_claim is private and must not be served stale (stale_secs must equal fresh_secs)"
                    .to_string(),
            ));
        }

        if self.cache.durable_enabled && self.cache.database_path.trim().is_empty() {
            return Err(PreviewError::Config(
                "cache.database_path is empty while the durable cache is enabled".to_string(),
            ));
        }

        if self.cache.dedup_window_ms == 0 {
            return Err(PreviewError::Config("cache.dedup_window_ms must be positive".to_string()));
        }

        if self.cache.memory_capacity == 0 {
            return Err(PreviewError::Config("cache.memory_capacity must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_published_budgets() {
        let config = Config::default();
        assert_eq!(config.freshness.project_config_fresh_secs, 86_400);
        assert_eq!(config.freshness.project_config_stale_secs, 172_800);
        assert_eq!(config.freshness.global_state_fresh_secs, 3_600);
        assert_eq!(config.freshness.global_state_stale_secs, 7_200);
        assert_eq!(config.freshness.user_claim_fresh_secs, 3_600);
        assert_eq!(config.freshness.user_claim_stale_secs, 3_600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = parse_config(
            r#"
            [cache]
            durable_enabled = false
            dedup_window_ms = 500
            "#,
        )
        .unwrap();

        assert!(!config.cache.durable_enabled);
        assert_eq!(config.cache.dedup_window_ms, 500);
        assert_eq!(config.cache.memory_capacity, 1_024);
        assert_eq!(config.freshness.global_state_stale_secs, 7_200);
    }

    #[test]
    fn test_private_category_cannot_be_served_stale() {
        let mut config = Config::default();
        config.freshness.user_claim_stale_secs = 7_200;
        let err = config.validate().unwrap_err();
        assert!(err.is_critical());
    }

    #[test]
    fn test_fresh_longer_than_stale_rejected() {
        let mut config = Config::default();
        config.freshness.global_state_fresh_secs = 10_000;
        assert!(matches!(config.validate(), Err(PreviewError::Config(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = parse_config("cache = 12").unwrap_err();
        assert!(matches!(err, PreviewError::Config(_)));
    }
}
