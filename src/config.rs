use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{AudioFormat, SinkSettings, DEFAULT_ASSEMBLY_CAPACITY, DEFAULT_VOICE_CHUNK_SIZE};
use crate::dispatch::DispatchSettings;
use crate::interrupt::GpioMonitorConfig;
use crate::protocol::{ReadLimits, ResponseFormat};
use crate::session::SessionConfig;

/// Client configuration file
///
/// Every field has a default, so an empty file (or none at all) is valid.
/// `VOICELINK__<SECTION>__<FIELD>` environment variables override the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub session: SessionSection,
    pub playback: PlaybackConfig,
    pub gpio: GpioConfig,
    pub tuning: TuningConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7860,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub response_format: ResponseFormat,
    /// Recording to upload
    pub voice_file: PathBuf,
    pub enable_upload: bool,
    pub voice_chunk_size: usize,
    /// Log the timing report after each session
    pub log_timing: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            voice_file: PathBuf::from("/tmp/my_recording.pcm"),
            enable_upload: true,
            voice_chunk_size: DEFAULT_VOICE_CHUNK_SIZE,
            log_timing: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub enable_streaming: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_width: u16,
    pub volume: u8,
    /// Write played audio to this WAV file; discard it when unset
    pub output_path: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enable_streaming: false,
            sample_rate: 8000,
            channels: 1,
            bit_width: 16,
            volume: 100,
            output_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub enabled: bool,
    pub debug_path: PathBuf,
    pub line: u32,
    pub poll_interval_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            debug_path: PathBuf::from("/sys/kernel/debug/gpio"),
            line: 1,
            poll_interval_ms: 50,
        }
    }
}

/// Protocol and playback timing knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub receive_timeout_secs: u64,
    pub max_payload_len: u32,
    pub ai_end_grace_ms: u64,
    pub non_progress_limit: u32,
    pub error_non_progress_limit: u32,
    pub assembly_capacity: usize,
    pub play_chunk_size: usize,
    pub busy_retry_limit: u32,
    pub busy_retry_backoff_ms: u64,
    pub drain_timeout_ms: u64,
    pub drain_attempts: u32,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            receive_timeout_secs: 30,
            max_payload_len: 640 * 1024,
            ai_end_grace_ms: 500,
            non_progress_limit: 5,
            error_non_progress_limit: 2,
            assembly_capacity: DEFAULT_ASSEMBLY_CAPACITY,
            play_chunk_size: 4096,
            busy_retry_limit: 3,
            busy_retry_backoff_ms: 10,
            drain_timeout_ms: 1000,
            drain_attempts: 1,
        }
    }
}

impl ClientConfig {
    /// Load from `path` (extension picks the format) plus environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("VOICELINK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration {:?}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.voice_chunk_size == 0 {
            bail!("session.voice_chunk_size must be positive");
        }
        if self.tuning.play_chunk_size == 0 {
            bail!("tuning.play_chunk_size must be positive");
        }
        if self.tuning.assembly_capacity == 0 {
            bail!("tuning.assembly_capacity must be positive");
        }
        if !matches!(self.playback.bit_width, 8 | 16 | 24 | 32) {
            bail!("playback.bit_width must be 8, 16, 24 or 32, got {}", self.playback.bit_width);
        }
        if self.playback.channels == 0 || self.playback.sample_rate == 0 {
            bail!("playback.channels and playback.sample_rate must be positive");
        }
        if self.playback.volume > 100 {
            bail!("playback.volume must be 0-100, got {}", self.playback.volume);
        }
        Ok(())
    }

    pub fn playback_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.playback.sample_rate,
            channels: self.playback.channels,
            bit_width: self.playback.bit_width,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            response_format: self.session.response_format,
            enable_streaming: self.playback.enable_streaming,
            playback_format: self.playback_format(),
            ai_end_grace: Duration::from_millis(self.tuning.ai_end_grace_ms),
            non_progress_limit: self.tuning.non_progress_limit,
            error_non_progress_limit: self.tuning.error_non_progress_limit,
            stop_on_error: true,
            read_limits: ReadLimits {
                max_payload_len: self.tuning.max_payload_len,
                timeout: Duration::from_secs(self.tuning.receive_timeout_secs),
            },
            assembly_capacity: self.tuning.assembly_capacity,
        }
    }

    pub fn sink_settings(&self) -> SinkSettings {
        SinkSettings {
            play_chunk_size: self.tuning.play_chunk_size,
            busy_retry_limit: self.tuning.busy_retry_limit,
            busy_retry_backoff: Duration::from_millis(self.tuning.busy_retry_backoff_ms),
            drain_timeout: Duration::from_millis(self.tuning.drain_timeout_ms),
            drain_attempts: self.tuning.drain_attempts,
            volume: self.playback.volume,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            connect_timeout: Duration::from_secs(self.server.connect_timeout_secs),
            enable_upload: self.session.enable_upload,
            voice_chunk_size: self.session.voice_chunk_size,
            dispatch: self.dispatch_settings(),
            ..SessionConfig::default()
        }
    }

    pub fn gpio_monitor_config(&self) -> GpioMonitorConfig {
        GpioMonitorConfig {
            line: self.gpio.line,
            poll_interval: Duration::from_millis(self.gpio.poll_interval_ms),
        }
    }
}
