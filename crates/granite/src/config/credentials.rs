use secrecy::SecretString;

use crate::config::schema::Settings;
use crate::error::ConfigError;
use crate::secrets::resolve_secret_optional;

/// API keys for the external services a real run talks to.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gemini: Option<SecretString>,
    pub lmnt: Option<SecretString>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini", &self.gemini.as_ref().map(|_| "[REDACTED]"))
            .field("lmnt", &self.lmnt.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Credentials {
    /// Resolves keys from the configured file and environment variables.
    ///
    /// The Gemini key file wins over the environment; after that each
    /// variable in `llm.api_key_envs` is tried in order.
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let mut gemini =
            resolve_secret_optional(settings.llm.api_key_file.as_deref(), None)?;

        if gemini.is_none() {
            for name in &settings.llm.api_key_envs {
                gemini = resolve_secret_optional(None, Some(name))?;
                if gemini.is_some() {
                    log::debug!("Using generative API key from {}", name);
                    break;
                }
            }
        }

        let lmnt = resolve_secret_optional(None, Some(&settings.tts.lmnt_api_key_env))?;

        Ok(Self { gemini, lmnt })
    }

    /// Fails when a real (non-simulated) run has no generative API key.
    pub fn require_ai_key(&self, settings: &Settings) -> Result<(), ConfigError> {
        if settings.simulate || self.gemini.is_some() {
            return Ok(());
        }
        Err(ConfigError::MissingCredential(format!(
            "set one of {} or enable simulate mode",
            settings.llm.api_key_envs.join(", ")
        )))
    }
}
