//! Narration synthesis with provider fallback.
//!
//! Providers are tried in order: LMNT (when a key is configured), the
//! `edge-tts` CLI, the `gtts-cli` CLI, and finally a silent track of the
//! planned length so the video can still be composed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::{RenderConfig, TtsConfig};
use crate::pipeline::{Stage, WorkflowError};

use super::plan::{LessonPlan, MAX_TOTAL_SECS};
use super::process::run_command;

pub const SCRIPT_FILE: &str = "narration.txt";
const SPEECH_FILE: &str = "narration.mp3";
const SILENT_FILE: &str = "narration.wav";

/// Anything smaller is an error page rather than audio.
const MIN_AUDIO_BYTES: u64 = 100;

const SILENT_SAMPLE_RATE: u32 = 16_000;
const TTS_TIMEOUT: Duration = Duration::from_secs(120);
const LMNT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which provider produced the narration track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    Lmnt,
    EdgeTts,
    Gtts,
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub audio_path: PathBuf,
    pub voice: Voice,
}

#[derive(Serialize)]
struct LmntRequest<'a> {
    text: &'a str,
    voice: &'a str,
    format: &'static str,
}

pub struct LmntClient {
    client: Client,
    endpoint: String,
    voice: String,
    api_key: SecretString,
}

impl LmntClient {
    pub fn new(config: &TtsConfig, api_key: SecretString) -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(LMNT_CONNECT_TIMEOUT)
            .timeout(TTS_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: config.lmnt_endpoint.clone(),
            voice: config.lmnt_voice.clone(),
            api_key,
        })
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-Key", self.api_key.expose_secret())
            .json(&LmntRequest {
                text,
                voice: &self.voice,
                format: "mp3",
            })
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("LMNT returned {}", status));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Synthesises the plan's narration into `out_dir`.
pub struct Narrator<'a> {
    pub tts: &'a TtsConfig,
    pub render: &'a RenderConfig,
    pub lmnt: Option<&'a LmntClient>,
}

impl Narrator<'_> {
    pub async fn narrate(&self, plan: &LessonPlan, out_dir: &Path) -> Result<Narration, WorkflowError> {
        let script = plan.narration_script();
        let script_path = out_dir.join(SCRIPT_FILE);
        std::fs::write(&script_path, &script).map_err(|e| {
            WorkflowError::fatal(Stage::Narration, format!("cannot write {}: {}", SCRIPT_FILE, e))
        })?;

        let speech_path = out_dir.join(SPEECH_FILE);

        if !script.trim().is_empty() {
            if let Some(lmnt) = self.lmnt {
                match lmnt.synthesize(&script).await {
                    Ok(bytes) if bytes.len() as u64 > MIN_AUDIO_BYTES => {
                        if std::fs::write(&speech_path, &bytes).is_ok() {
                            return Ok(narration(speech_path, Voice::Lmnt));
                        }
                    }
                    Ok(bytes) => warn!("LMNT returned only {} bytes, falling back", bytes.len()),
                    Err(e) => warn!("LMNT synthesis failed, falling back: {}", e),
                }
            }

            if self.edge_tts(&script_path, &speech_path).await {
                return Ok(narration(speech_path, Voice::EdgeTts));
            }
            if self.gtts(&script_path, &speech_path).await {
                return Ok(narration(speech_path, Voice::Gtts));
            }
        }

        let silent_path = out_dir.join(SILENT_FILE);
        let secs = plan.total_duration_secs();
        warn!("No speech provider succeeded; using {:.0}s of silence", secs);
        let target = silent_path.clone();
        tokio::task::spawn_blocking(move || write_silence(&target, secs))
            .await
            .map_err(|e| WorkflowError::fatal(Stage::Narration, format!("silent track writer failed: {}", e)))?
            .map_err(|e| WorkflowError::fatal(Stage::Narration, format!("cannot write silent track: {}", e)))?;
        Ok(narration(silent_path, Voice::Silent))
    }

    async fn edge_tts(&self, script: &Path, out: &Path) -> bool {
        let rate = format!("--rate={}", self.tts.edge_rate);
        let args = [
            OsStr::new("--voice"),
            OsStr::new(&self.tts.edge_voice),
            OsStr::new(&rate),
            OsStr::new("-f"),
            script.as_os_str(),
            OsStr::new("--write-media"),
            out.as_os_str(),
        ];
        self.run_tts(&self.render.edge_tts_binary, args, out).await
    }

    async fn gtts(&self, script: &Path, out: &Path) -> bool {
        let args = [
            OsStr::new("-f"),
            script.as_os_str(),
            OsStr::new("--lang"),
            OsStr::new(&self.tts.language),
            OsStr::new("--output"),
            out.as_os_str(),
        ];
        self.run_tts(&self.render.gtts_binary, args, out).await
    }

    async fn run_tts<'b>(&self, program: &str, args: impl IntoIterator<Item = &'b OsStr>, out: &Path) -> bool {
        match run_command(program, args, None, TTS_TIMEOUT).await {
            Ok(_) if audio_ok(out) => true,
            Ok(_) => {
                warn!("{} produced no usable audio", program);
                false
            }
            Err(e) => {
                warn!("{} failed: {}", program, e);
                false
            }
        }
    }
}

fn narration(audio_path: PathBuf, voice: Voice) -> Narration {
    info!("Narration synthesised with {:?}", voice);
    Narration { audio_path, voice }
}

fn audio_ok(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.len() > MIN_AUDIO_BYTES)
        .unwrap_or(false)
}

/// Writes a 16 kHz mono 16-bit WAV of silence lasting `secs`, kept between
/// one second and [`MAX_TOTAL_SECS`].
pub fn write_silence(path: &Path, secs: f64) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SILENT_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let secs = if secs.is_finite() { secs.clamp(1.0, MAX_TOTAL_SECS) } else { 1.0 };
    let samples = (secs * SILENT_SAMPLE_RATE as f64).round() as u64;

    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}
