use super::config::SessionConfig;
use super::stats::{stamp, SessionStats};
use crate::audio::{PlaybackHandle, VoiceSource};
use crate::dispatch::{Dispatcher, ResponseEvent, Termination};
use crate::interrupt::InterruptController;
use crate::protocol::{write_frame, ConfigPayload, MessageKind};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of a completed exchange
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub termination: Termination,
    pub stats: SessionStats,
}

/// Drives one voice request/response cycle against the inference server
pub struct VoiceSession {
    config: SessionConfig,
    controller: Arc<InterruptController>,
    playback: Option<PlaybackHandle>,
    events: Option<mpsc::UnboundedSender<ResponseEvent>>,
}

impl VoiceSession {
    pub fn new(config: SessionConfig, controller: Arc<InterruptController>) -> Self {
        Self {
            config,
            controller,
            playback: None,
            events: None,
        }
    }

    /// Play streamed audio through this worker
    pub fn with_playback(mut self, playback: PlaybackHandle) -> Self {
        self.playback = Some(playback);
        self
    }

    /// Receive text, JSON and error payloads as they arrive
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ResponseEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Upload `voice` and process the response
    ///
    /// Returns `None` without connecting when upload is disabled.
    pub async fn run(&self, voice: &mut dyn VoiceSource) -> Result<Option<SessionReport>> {
        if !self.config.enable_upload {
            info!("Upload disabled, skipping session {}", self.config.session_id);
            return Ok(None);
        }

        let addr = self.config.server_addr();
        info!("Session {}: connecting to {}", self.config.session_id, addr);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .with_context(|| format!("Timed out connecting to {}", addr))?
            .with_context(|| format!("Failed to connect to {}", addr))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut stats = SessionStats::new(self.config.session_id.clone());

        self.send_config(&mut writer, &mut stats).await?;
        self.send_voice(&mut writer, voice, &mut stats).await?;

        let mut dispatcher = Dispatcher::new(
            self.config.dispatch.clone(),
            self.controller.clone(),
            self.playback.clone(),
            stats,
        );
        if let Some(events) = &self.events {
            dispatcher = dispatcher.with_events(events.clone());
        }

        let termination = dispatcher
            .run(&mut reader)
            .await
            .context("Failed to receive AI response")?;

        if let Err(e) = writer.shutdown().await {
            debug!("Socket shutdown failed: {}", e);
        }

        if !termination.is_clean() {
            warn!("Session {} ended: {}", self.config.session_id, termination);
        } else {
            info!("Session {} ended: {}", self.config.session_id, termination);
        }

        Ok(Some(SessionReport {
            session_id: self.config.session_id.clone(),
            termination,
            stats: dispatcher.into_stats(),
        }))
    }

    async fn send_config<W>(&self, writer: &mut W, stats: &mut SessionStats) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let payload = ConfigPayload::new(self.config.dispatch.response_format);
        let json = serde_json::to_vec(&payload).context("Failed to serialize config payload")?;

        write_frame(writer, MessageKind::Config, &json)
            .await
            .context("Failed to send CONFIG")?;
        stamp(&mut stats.config_sent_at);

        info!("Requested response format: {}", payload.response_format);
        Ok(())
    }

    async fn send_voice<W>(
        &self,
        writer: &mut W,
        voice: &mut dyn VoiceSource,
        stats: &mut SessionStats,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        info!("Uploading voice from {}", voice.name());

        write_frame(writer, MessageKind::VoiceStart, &[])
            .await
            .context("Failed to send VOICE_START")?;
        stamp(&mut stats.voice_start_at);

        while let Some(chunk) = voice.next_chunk().await? {
            write_frame(writer, MessageKind::VoiceData, &chunk)
                .await
                .with_context(|| {
                    format!(
                        "Failed to send VOICE_DATA packet {} ({} bytes)",
                        stats.voice_packets + 1,
                        chunk.len()
                    )
                })?;
            stats.record_voice_chunk(chunk.len());
        }

        write_frame(writer, MessageKind::VoiceEnd, &[])
            .await
            .context("Failed to send VOICE_END")?;
        stamp(&mut stats.voice_end_at);

        info!(
            "Voice upload complete: {} bytes in {} packets",
            stats.voice_bytes, stats.voice_packets
        );
        Ok(())
    }
}
