use thiserror::Error;

use super::schema::Config;

pub const FEED_MODE_SIMULATED: &str = "simulated";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "tick_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.smtp.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "smtp.host must not be empty".to_string(),
            ));
        }
        if self.smtp.port == 0 {
            return Err(ConfigError::Validation(
                "smtp.port must be greater than 0".to_string(),
            ));
        }
        if self.smtp.login.trim().is_empty() {
            return Err(ConfigError::Validation(
                "smtp.login must not be empty".to_string(),
            ));
        }
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.path must not be empty".to_string(),
            ));
        }
        if self.feed.mode != FEED_MODE_SIMULATED {
            return Err(ConfigError::Validation(format!(
                "feed.mode '{}' is not supported, expected '{}'",
                self.feed.mode, FEED_MODE_SIMULATED
            )));
        }
        if self.feed.sample_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "feed.sample_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    fn parse(raw: &str) -> Config {
        toml::from_str(raw).expect("config should parse")
    }

    const MINIMAL: &str = r#"
        [smtp]
        host = "smtp.example.org"
        login = "alarms@example.org"
        password = "secret"
    "#;

    #[test]
    fn minimal_config_passes_with_defaults() {
        let config = parse(MINIMAL);
        config.validate().expect("minimal config should be valid");
        assert_eq!(config.tick_interval_secs, 15);
        assert_eq!(config.event_queue_capacity, 50_000);
        assert_eq!(config.smtp.port, 465);
        assert_eq!(config.smtp.sender(), "alarms@example.org");
        assert_eq!(config.feed.mode, "simulated");
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let mut config = parse(MINIMAL);
        config.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_feed_mode_is_rejected() {
        let mut config = parse(MINIMAL);
        config.feed.mode = "epics".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_from_overrides_login_as_sender() {
        let mut config = parse(MINIMAL);
        config.smtp.from = Some("noreply@example.org".to_string());
        assert_eq!(config.smtp.sender(), "noreply@example.org");
    }
}
