use std::path::Path;

use crate::config::schema::Settings;
use crate::error::ConfigError;

/// Loads settings from an optional JSON or YAML file, then applies
/// `GRANITE_*` environment overrides and validates the result.
///
/// Without a path the built-in defaults are used.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            if is_yaml(path) {
                load_settings_from_yaml(&content)?
            } else {
                load_settings_from_str(&content)?
            }
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings)?;
    validate_settings(&settings)?;

    log::debug!(
        "Loaded settings: output_directory={}, max_attempts={}, simulate={}",
        settings.output_directory,
        settings.retry.max_attempts,
        settings.simulate
    );

    Ok(settings)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn load_settings_from_yaml(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_yaml::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    if let Some(value) = env_value("GRANITE_OUTPUT_DIR") {
        settings.output_directory = value;
    }
    if let Some(value) = env_value("GRANITE_BIND_ADDRESS") {
        settings.server.bind_address = value;
    }
    if let Some(value) = env_value("GRANITE_UPLOAD_DIR") {
        settings.server.upload_directory = value;
    }
    if let Some(value) = env_value("GRANITE_MAX_ATTEMPTS") {
        settings.retry.max_attempts = parse_env("GRANITE_MAX_ATTEMPTS", &value)?;
    }
    if let Some(value) = env_value("GRANITE_BASE_WAIT_SECS") {
        settings.retry.base_wait_secs = parse_env("GRANITE_BASE_WAIT_SECS", &value)?;
    }
    if let Some(value) = env_value("GRANITE_MAX_WAIT_SECS") {
        settings.retry.max_wait_secs = parse_env("GRANITE_MAX_WAIT_SECS", &value)?;
    }
    if let Some(value) = env_value("GRANITE_SIMULATE") {
        settings.simulate = parse_bool("GRANITE_SIMULATE", &value)?;
    }
    if let Some(value) = env_value("GRANITE_LOG_JSON") {
        settings.logging.json = parse_bool("GRANITE_LOG_JSON", &value)?;
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnv {
            name: name.to_string(),
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    if settings.retry.base_wait_secs > settings.retry.max_wait_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.base_wait_secs ({}) must not exceed retry.max_wait_secs ({})",
                settings.retry.base_wait_secs, settings.retry.max_wait_secs
            ),
        });
    }

    if settings.server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "server.bind_address must not be empty".to_string(),
        });
    }

    if settings.output_directory.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "output_directory must not be empty".to_string(),
        });
    }

    Ok(())
}
