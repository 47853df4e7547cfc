use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Timing and volume figures for one request/response exchange
///
/// Timestamps record the first occurrence of each event only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub config_sent_at: Option<DateTime<Utc>>,
    pub voice_start_at: Option<DateTime<Utc>>,
    pub voice_first_data_at: Option<DateTime<Utc>>,
    pub voice_end_at: Option<DateTime<Utc>>,
    pub ai_start_at: Option<DateTime<Utc>>,
    pub audio_start_at: Option<DateTime<Utc>>,
    pub audio_first_data_at: Option<DateTime<Utc>>,
    /// Playback device finished setup
    pub playback_ready_at: Option<DateTime<Utc>>,
    /// First segment handed to the device
    pub first_played_at: Option<DateTime<Utc>>,
    pub ai_end_at: Option<DateTime<Utc>>,

    pub voice_bytes: u64,
    pub voice_packets: u64,
    pub messages_received: u64,
    pub audio_packets: u64,
    pub audio_bytes: u64,
    pub segments_played: u64,
    pub play_failures: u64,
    /// AUDIO_DATA dropped because playback had been interrupted
    pub dropped_audio_packets: u64,
    /// Payloads too large to buffer
    pub unplayable_payloads: u64,

    /// How the response loop ended
    pub termination: Option<String>,
}

/// Set `slot` to now unless it already holds a time
pub fn stamp(slot: &mut Option<DateTime<Utc>>) {
    if slot.is_none() {
        *slot = Some(Utc::now());
    }
}

fn between(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Option<Duration> {
    Some(to? - from?)
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn record_voice_chunk(&mut self, bytes: usize) {
        stamp(&mut self.voice_first_data_at);
        self.voice_bytes += bytes as u64;
        self.voice_packets += 1;
    }

    pub fn record_audio_packet(&mut self, bytes: usize) {
        stamp(&mut self.audio_first_data_at);
        self.audio_packets += 1;
        self.audio_bytes += bytes as u64;
    }

    pub fn record_segment_played(&mut self) {
        stamp(&mut self.first_played_at);
        self.segments_played += 1;
    }

    /// Voice start to the server's AI_START
    pub fn response_latency(&self) -> Option<Duration> {
        between(self.voice_start_at, self.ai_start_at)
    }

    /// Voice start to the first audio reaching the device
    pub fn time_to_first_audio(&self) -> Option<Duration> {
        between(self.voice_start_at, self.first_played_at)
    }

    pub fn ai_start_to_first_audio(&self) -> Option<Duration> {
        between(self.ai_start_at, self.first_played_at)
    }

    pub fn upload_duration(&self) -> Option<Duration> {
        between(self.voice_start_at, self.voice_end_at)
    }

    /// Voice upload rate in bytes per second
    pub fn upload_throughput(&self) -> Option<f64> {
        let ms = self.upload_duration()?.num_milliseconds();
        if ms <= 0 {
            return None;
        }
        Some(self.voice_bytes as f64 * 1000.0 / ms as f64)
    }

    pub fn log_report(&self) {
        let ms = |d: Option<Duration>| {
            d.map(|d| format!("{} ms", d.num_milliseconds()))
                .unwrap_or_else(|| "n/a".to_string())
        };

        info!("Session {} report:", self.session_id);
        info!(
            "  Voice: {} bytes in {} packets, upload {} ({})",
            self.voice_bytes,
            self.voice_packets,
            ms(self.upload_duration()),
            self.upload_throughput()
                .map(|bps| format!("{:.1} KB/s", bps / 1024.0))
                .unwrap_or_else(|| "n/a".to_string())
        );
        info!(
            "  Response: {} messages, {} audio packets ({} bytes)",
            self.messages_received, self.audio_packets, self.audio_bytes
        );
        info!(
            "  Playback: {} segments played, {} failures, {} dropped after interrupt, {} unplayable",
            self.segments_played,
            self.play_failures,
            self.dropped_audio_packets,
            self.unplayable_payloads
        );
        info!(
            "  Latency: voice->AI start {}, voice->first audio {}, AI start->first audio {}",
            ms(self.response_latency()),
            ms(self.time_to_first_audio()),
            ms(self.ai_start_to_first_audio())
        );
        if let Some(termination) = &self.termination {
            info!("  Ended: {}", termination);
        }
    }
}
