pub mod credentials;
pub mod loader;
pub mod schema;

pub use credentials::Credentials;
pub use loader::{load_settings, load_settings_from_str, load_settings_from_yaml};
pub use schema::{
    LlmConfig, LoggingConfig, RenderConfig, RetryConfig, ServerConfig, Settings, TtsConfig,
};
