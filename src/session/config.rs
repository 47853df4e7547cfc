use std::time::Duration;

use crate::audio::DEFAULT_VOICE_CHUNK_SIZE;
use crate::dispatch::DispatchSettings;

/// Configuration for one voice request/response exchange
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier used in logs and stats (e.g., "session-5f0c...")
    pub session_id: String,

    /// Inference server host
    pub host: String,

    /// Inference server port
    pub port: u16,

    /// Give up on connecting after this long
    pub connect_timeout: Duration,

    /// Send the recording at all; when false the session is skipped
    pub enable_upload: bool,

    /// Bytes per VOICE_DATA frame
    pub voice_chunk_size: usize,

    /// Receive-loop behaviour, including the negotiated response format
    pub dispatch: DispatchSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            host: "127.0.0.1".to_string(),
            port: 7860,
            connect_timeout: Duration::from_secs(10),
            enable_upload: true,
            voice_chunk_size: DEFAULT_VOICE_CHUNK_SIZE,
            dispatch: DispatchSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
