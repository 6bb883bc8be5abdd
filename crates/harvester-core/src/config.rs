use std::path::Path;

use crate::app_config::AppConfig;
use crate::ConfigError;

/// Load the configuration file at `path` and apply environment overrides.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or parsed, an override is
/// invalid, or the resulting values fail validation.
pub fn load_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    build_app_config(&content, |key| std::env::var(key))
}

/// Parse the YAML `content` and apply overrides from the provided env-var
/// lookup function.
///
/// Decoupled from the real environment so it can be tested with a pure
/// `HashMap` lookup.
pub(crate) fn build_app_config<F>(content: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let mut config: AppConfig = if content.trim().is_empty() {
        AppConfig::default()
    } else {
        serde_yaml::from_str(content).map_err(ConfigError::FileParse)?
    };

    let parse_usize = |var: &str| -> Result<Option<usize>, ConfigError> {
        lookup(var)
            .ok()
            .map(|raw| {
                raw.parse::<usize>().map_err(|e| ConfigError::InvalidEnvVar {
                    var: var.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    };

    let parse_u16 = |var: &str| -> Result<Option<u16>, ConfigError> {
        lookup(var)
            .ok()
            .map(|raw| {
                raw.parse::<u16>().map_err(|e| ConfigError::InvalidEnvVar {
                    var: var.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    };

    if let Ok(host) = lookup("HARVESTER_KAFKA_HOST") {
        config.kafka.host = host;
    }
    if let Some(port) = parse_u16("HARVESTER_KAFKA_PORT")? {
        config.kafka.port = port;
    }
    if let Some(max_workers) = parse_usize("HARVESTER_MAX_WORKERS")? {
        config.general.max_workers = max_workers;
    }
    if let Ok(level) = lookup("HARVESTER_LOG_LEVEL") {
        config.general.log_level = level;
    }

    let secret = |var: &str, slot: &mut Option<String>| {
        if let Ok(value) = lookup(var) {
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    };
    secret("REDDIT_CLIENT_ID", &mut config.reddit.client_id);
    secret("REDDIT_CLIENT_SECRET", &mut config.reddit.client_secret);
    secret("TWITTER_CONSUMER_KEY", &mut config.twitter.consumer_key);
    secret("TWITTER_CONSUMER_SECRET", &mut config.twitter.consumer_secret);
    secret("TWITTER_BEARER_TOKEN", &mut config.twitter.bearer_token);
    secret("DATABASE_URL", &mut config.database.url);

    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.general.max_workers == 0 {
        return Err(ConfigError::Invalid {
            field: "general.max_workers",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.general.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "general.request_timeout_secs",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.kafka.host.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "kafka.host",
            reason: "must not be empty".to_string(),
        });
    }
    if config.database.max_connections == 0 {
        return Err(ConfigError::Invalid {
            field: "database.max_connections",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.twitter.trend_refresh_secs == 0 {
        return Err(ConfigError::Invalid {
            field: "twitter.trend_refresh_secs",
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
