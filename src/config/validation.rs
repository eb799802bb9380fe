//! Configuration validation.
//!
//! Semantic checks serde cannot express: the log level must be one the
//! sink understands and the custom access time layout must be a valid
//! strftime string (chrono refuses to render invalid ones at request time).

use chrono::format::{Item, StrftimeItems};

use crate::config::schema::GatewayConfig;
use crate::error::ConfigError;
use crate::observability::logging::parse_level;

/// Validate a parsed configuration, returning the first problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    parse_level(&config.log.level)?;
    validate_time_format(&config.access.custom_time_format)?;
    Ok(())
}

/// Reject strftime layouts chrono cannot render.
pub fn validate_time_format(layout: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidTimeFormat(layout.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&GatewayConfig::default()).is_ok());
    }

    #[test]
    fn invalid_time_format_rejected() {
        let mut config = GatewayConfig::default();
        config.access.custom_time_format = "%Y-%".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn invalid_level_rejected() {
        let mut config = GatewayConfig::default();
        config.log.level = "verbose".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidLevel(_))
        ));
    }
}
