//! Secret resolution for API credentials.
//!
//! Credentials are resolved from multiple sources in priority order:
//!
//! 1. **File reference** - For Docker secrets (e.g. `/run/secrets/gemini_api_key`)
//! 2. **Env var reference** - The usual deployment path (e.g. `GEMINI_API_KEY`)

use secrecy::SecretString;
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need a file path or an env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from the file at `file_path` if given, otherwise from
/// the environment variable `env_var`.
///
/// An empty or whitespace-only environment variable counts as unset.
pub fn resolve_secret(file_path: Option<&str>, env_var: Option<&str>) -> Result<SecretString> {
    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            return match fs::read_to_string(&expanded) {
                Ok(content) => Ok(SecretString::from(content.trim().to_string())),
                Err(e) => Err(SecretError::FileReadError {
                    path: expanded,
                    source: e,
                }),
            };
        }
    }

    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                Ok(value) if !value.trim().is_empty() => {
                    // Env vars may carry trailing newlines from shell exports
                    Ok(SecretString::from(value.trim()))
                }
                Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves a secret, returning `None` when no source yields a value.
///
/// Missing environment variables are treated the same as no source, so a
/// chain of optional keys can be tried one after another.
pub fn resolve_secret_optional(
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>> {
    match resolve_secret(file_path, env_var) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Expands `~` to the user's home directory.
///
/// Only `~` and `~/path` are supported, not `~user/path`.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
