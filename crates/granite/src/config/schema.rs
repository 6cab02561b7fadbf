use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub render: RenderConfig,
    /// Run the simulated workflow instead of calling external services.
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_directory() -> String {
    "output_videos".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            output_directory: default_output_directory(),
            retry: RetryConfig::default(),
            llm: LlmConfig::default(),
            tts: TtsConfig::default(),
            render: RenderConfig::default(),
            simulate: false,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_upload_directory")]
    pub upload_directory: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_upload_directory() -> String {
    "uploads".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            upload_directory: default_upload_directory(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_wait_secs")]
    pub base_wait_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Keep displayed progress at its high-water mark across retries.
    #[serde(default = "default_true")]
    pub hold_progress: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_wait_secs() -> u64 {
    30
}

fn default_max_wait_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_wait_secs: default_base_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
            hold_progress: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Environment variables tried in order for the API key.
    #[serde(default = "default_api_key_envs")]
    pub api_key_envs: Vec<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_api_key_envs() -> Vec<String> {
    vec!["GEMINI_API_KEY".to_string(), "GEMINI_API_KEY_2".to_string()]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
            api_key_envs: default_api_key_envs(),
            api_key_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_lmnt_key_env")]
    pub lmnt_api_key_env: String,
    #[serde(default = "default_lmnt_endpoint")]
    pub lmnt_endpoint: String,
    #[serde(default = "default_lmnt_voice")]
    pub lmnt_voice: String,
    #[serde(default = "default_edge_voice")]
    pub edge_voice: String,
    #[serde(default = "default_edge_rate")]
    pub edge_rate: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_lmnt_key_env() -> String {
    "LMNT_API_KEY".to_string()
}

fn default_lmnt_endpoint() -> String {
    "https://api.lmnt.com/v1/ai/speech/bytes".to_string()
}

fn default_lmnt_voice() -> String {
    "lily".to_string()
}

fn default_edge_voice() -> String {
    "en-US-AriaNeural".to_string()
}

fn default_edge_rate() -> String {
    "-5%".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            lmnt_api_key_env: default_lmnt_key_env(),
            lmnt_endpoint: default_lmnt_endpoint(),
            lmnt_voice: default_lmnt_voice(),
            edge_voice: default_edge_voice(),
            edge_rate: default_edge_rate(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_manim")]
    pub manim_binary: String,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_binary: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_binary: String,
    #[serde(default = "default_pdftotext")]
    pub pdftotext_binary: String,
    #[serde(default = "default_edge_tts")]
    pub edge_tts_binary: String,
    #[serde(default = "default_gtts")]
    pub gtts_binary: String,
    /// Manim quality flag (`l`, `m`, `h`, `k`).
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
    #[serde(default = "default_compose_timeout_secs")]
    pub compose_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
}

fn default_manim() -> String {
    "manim".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}

fn default_edge_tts() -> String {
    "edge-tts".to_string()
}

fn default_gtts() -> String {
    "gtts-cli".to_string()
}

fn default_quality() -> String {
    "l".to_string()
}

fn default_render_timeout_secs() -> u64 {
    300
}

fn default_compose_timeout_secs() -> u64 {
    120
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_extract_timeout_secs() -> u64 {
    60
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            manim_binary: default_manim(),
            ffmpeg_binary: default_ffmpeg(),
            ffprobe_binary: default_ffprobe(),
            pdftotext_binary: default_pdftotext(),
            edge_tts_binary: default_edge_tts(),
            gtts_binary: default_gtts(),
            quality: default_quality(),
            render_timeout_secs: default_render_timeout_secs(),
            compose_timeout_secs: default_compose_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            extract_timeout_secs: default_extract_timeout_secs(),
        }
    }
}

impl RenderConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn compose_timeout(&self) -> Duration {
        Duration::from_secs(self.compose_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
