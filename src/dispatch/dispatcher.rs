// Response dispatcher
//
// Interprets server frames for one exchange: drives the shared response
// flags, routes audio through the assembly buffer to the playback worker and
// decides when the receive loop ends.

use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{
    AssemblyBuffer, AssemblyEvent, AudioFormat, PlayOutcome, PlaybackHandle,
    DEFAULT_ASSEMBLY_CAPACITY,
};
use crate::interrupt::InterruptController;
use crate::protocol::{read_frame, AudioPayload, FrameError, Message, ReadLimits, ResponseFormat};
use crate::session::stats::{stamp, SessionStats};

/// Receive-loop tuning
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub response_format: ResponseFormat,
    /// Play AUDIO_DATA as it arrives
    pub enable_streaming: bool,
    pub playback_format: AudioFormat,
    /// How long to keep reading after AI_END (default: 500ms)
    pub ai_end_grace: Duration,
    /// Consecutive non-progress messages that end the loop (default: 5)
    pub non_progress_limit: u32,
    /// Same limit once an ERROR has been seen (default: 2)
    pub error_non_progress_limit: u32,
    /// Treat ERROR as terminal (default: true)
    pub stop_on_error: bool,
    pub read_limits: ReadLimits,
    pub assembly_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            enable_streaming: false,
            playback_format: AudioFormat::default(),
            ai_end_grace: Duration::from_millis(500),
            non_progress_limit: 5,
            error_non_progress_limit: 2,
            stop_on_error: true,
            read_limits: ReadLimits::default(),
            assembly_capacity: DEFAULT_ASSEMBLY_CAPACITY,
        }
    }
}

/// Text surfaced to the caller while a response is processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Text(String),
    Json(String),
    Error(String),
}

/// Why the receive loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// AI_END received (after the grace window)
    AiEnd,
    /// JSON_RESPONSE in json mode
    JsonResponse,
    ServerError(String),
    Cancelled,
    /// Too many consecutive messages without progress
    NonProgress { count: u32 },
    /// Button press aborted the response
    Interrupted,
    /// Receive failed after at least one message
    PeerClosed { after: u64 },
}

impl Termination {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::AiEnd | Self::JsonResponse | Self::PeerClosed { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AiEnd => write!(f, "AI_END"),
            Self::JsonResponse => write!(f, "JSON response"),
            Self::ServerError(msg) => write!(f, "server error: {}", msg),
            Self::Cancelled => write!(f, "cancelled by server"),
            Self::NonProgress { count } => write!(f, "{} consecutive non-progress messages", count),
            Self::Interrupted => write!(f, "interrupted by user"),
            Self::PeerClosed { after } => write!(f, "peer closed after {} messages", after),
        }
    }
}

/// Loop decision after one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Terminate(Termination),
}

pub struct Dispatcher {
    settings: DispatchSettings,
    controller: Arc<InterruptController>,
    playback: Option<PlaybackHandle>,
    assembly: AssemblyBuffer,
    /// Playback was set up for the current audio segment
    audio_started: bool,
    non_progress: u32,
    error_seen: bool,
    events: Option<mpsc::UnboundedSender<ResponseEvent>>,
    stats: SessionStats,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        controller: Arc<InterruptController>,
        playback: Option<PlaybackHandle>,
        stats: SessionStats,
    ) -> Self {
        let assembly = AssemblyBuffer::new(settings.assembly_capacity);
        Self {
            settings,
            controller,
            playback,
            assembly,
            audio_started: false,
            non_progress: 0,
            error_seen: false,
            events: None,
            stats,
        }
    }

    /// Forward text, JSON and error payloads to a channel
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ResponseEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn into_stats(self) -> SessionStats {
        self.stats
    }

    pub fn audio_started(&self) -> bool {
        self.audio_started
    }

    pub fn buffered_audio(&self) -> usize {
        self.assembly.len()
    }

    fn emit(&self, event: ResponseEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Apply one message and decide whether the loop continues
    pub async fn handle(&mut self, message: Message) -> Step {
        self.stats.messages_received += 1;
        let kind = message.kind();

        let step = match message {
            Message::Text(text) => {
                info!("AI text: {}", text);
                self.emit(ResponseEvent::Text(text));
                Step::Continue
            }
            Message::JsonResponse(json) => {
                info!("AI JSON response: {}", json);
                self.emit(ResponseEvent::Json(json));
                if self.settings.response_format == ResponseFormat::Json {
                    Step::Terminate(Termination::JsonResponse)
                } else {
                    Step::Continue
                }
            }
            Message::Error(text) => {
                error!("Server error: {}", text);
                self.emit(ResponseEvent::Error(text.clone()));
                self.error_seen = true;
                self.stop_playback().await;
                if self.settings.stop_on_error {
                    Step::Terminate(Termination::ServerError(text))
                } else {
                    Step::Continue
                }
            }
            Message::AiStart => {
                info!("AI response started");
                stamp(&mut self.stats.ai_start_at);
                self.controller.set_ai_response_active(true);
                Step::Continue
            }
            Message::AiEnd => {
                info!("AI response finished");
                stamp(&mut self.stats.ai_end_at);
                self.controller.set_ai_response_active(false);
                Step::Terminate(Termination::AiEnd)
            }
            Message::AiCancelled => {
                info!("AI response cancelled by server");
                self.controller.set_ai_response_active(false);
                self.stop_playback().await;
                Step::Terminate(Termination::Cancelled)
            }
            Message::AudioStart => {
                self.start_audio().await;
                Step::Continue
            }
            Message::Audio(payload) => {
                self.handle_audio(payload).await;
                Step::Continue
            }
            Message::AudioEnd => {
                self.end_audio().await;
                Step::Continue
            }
            Message::AiNewChat => {
                info!("Server started a new chat");
                Step::Continue
            }
            Message::Config(payload) => {
                debug!("Config message from server: {}", payload);
                Step::Continue
            }
            Message::VoiceStart | Message::VoiceData(_) | Message::VoiceEnd => {
                debug!("Ignoring client-side message {} from server", kind);
                Step::Continue
            }
            Message::Unrecognized { kind, payload } => {
                warn!(
                    "Unrecognized message type 0x{:02X} ({} bytes), ignoring",
                    kind,
                    payload.len()
                );
                Step::Continue
            }
        };

        if let Step::Terminate(_) = step {
            return step;
        }

        if kind.is_progress() {
            self.non_progress = 0;
            return step;
        }

        self.non_progress += 1;
        let limit = if self.error_seen {
            self.settings.error_non_progress_limit
        } else {
            self.settings.non_progress_limit
        };
        if self.non_progress >= limit {
            warn!(
                "{} consecutive messages without progress (last {}), ending response loop",
                self.non_progress, kind
            );
            return Step::Terminate(Termination::NonProgress {
                count: self.non_progress,
            });
        }

        step
    }

    async fn start_audio(&mut self) {
        info!("Audio stream started");
        stamp(&mut self.stats.audio_start_at);
        self.assembly.clear();

        if !self.settings.enable_streaming {
            debug!("Streaming playback disabled, audio will not be played");
            return;
        }
        let Some(playback) = &self.playback else {
            warn!("Streaming enabled but no playback device available");
            return;
        };

        // A press during setup queues its hard stop behind the setup, so the
        // device is already released when the epoch has moved
        let epoch = self.controller.interrupt_epoch();
        match playback.setup(self.settings.playback_format).await {
            Ok(()) if self.controller.resume_playing(epoch) => {
                self.audio_started = true;
                stamp(&mut self.stats.playback_ready_at);
            }
            Ok(()) => {
                info!("Playback interrupted during setup, segment will not be played");
                self.audio_started = false;
            }
            Err(e) => {
                error!("Playback setup failed, segment will not be played: {}", e);
                self.audio_started = false;
            }
        }
    }

    async fn handle_audio(&mut self, payload: AudioPayload) {
        self.stats.record_audio_packet(payload.len());

        if self.controller.is_interrupted() {
            debug!("Playback interrupted, dropping {} audio bytes", payload.len());
            self.stats.dropped_audio_packets += 1;
            self.assembly.clear();
            return;
        }

        if !self.audio_started {
            debug!("Playback not started, ignoring {} audio bytes", payload.len());
            return;
        }

        for event in self.assembly.push(payload) {
            match event {
                AssemblyEvent::Flush(segment) | AssemblyEvent::Direct(segment) => {
                    self.play(segment).await;
                }
                AssemblyEvent::Unplayable(len) => {
                    error!("Unplayable audio payload of {} bytes dropped", len);
                    self.stats.unplayable_payloads += 1;
                }
            }
        }
    }

    async fn end_audio(&mut self) {
        info!("Audio stream finished");

        if !self.audio_started {
            self.assembly.clear();
            return;
        }

        if let Some(rest) = self.assembly.take() {
            debug!("Playing remaining {} buffered bytes", rest.len());
            self.play(rest).await;
        }
        self.teardown().await;
    }

    async fn play(&mut self, segment: Vec<u8>) {
        let Some(playback) = &self.playback else {
            return;
        };
        let len = segment.len();

        match playback.play(segment).await {
            Ok(PlayOutcome::Played { chunks }) => {
                debug!("Played {} bytes in {} chunks", len, chunks);
                self.stats.record_segment_played();
            }
            Ok(PlayOutcome::Truncated { chunks }) => {
                debug!("Playback stopped after {} chunks of a {} byte segment", chunks, len);
                self.stats.record_segment_played();
            }
            Ok(PlayOutcome::Skipped) => {
                debug!("Playback inactive, {} bytes skipped", len);
            }
            Err(e) => {
                error!("Failed to play {} audio bytes: {}", len, e);
                self.stats.play_failures += 1;
            }
        }

        if let Err(e) = playback.query_status().await {
            debug!("Playback status unavailable: {}", e);
        }
    }

    async fn teardown(&mut self) {
        self.audio_started = false;
        if let Some(playback) = &self.playback {
            if let Err(e) = playback.teardown().await {
                error!("Playback teardown failed: {}", e);
            }
        }
        // The worker clears it too; keep the flag right even without a worker
        self.controller.set_playing(false);
    }

    /// Tear down playback without playing what is still buffered
    async fn stop_playback(&mut self) {
        self.assembly.clear();
        if self.audio_started {
            info!("Stopping active playback");
            self.teardown().await;
        }
    }

    /// Receive and handle frames until the response ends
    ///
    /// A receive failure before any message is returned as an error; after
    /// at least one message it counts as the peer closing.
    pub async fn run<R>(&mut self, reader: &mut R) -> Result<Termination, FrameError>
    where
        R: AsyncRead + Unpin,
    {
        // A press left over from an earlier exchange must not end this one
        self.controller.clear_abort();
        let mut abort = self.controller.subscribe_abort();
        let limits = self.settings.read_limits;

        let result = loop {
            if *abort.borrow_and_update() {
                info!("Response loop aborted by user");
                break Ok(Termination::Interrupted);
            }

            let frame = tokio::select! {
                biased;
                _ = wait_for_abort(&mut abort) => continue,
                frame = read_frame(reader, limits) => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) if self.stats.messages_received > 0 => {
                    info!(
                        "Receive ended after {} messages: {}",
                        self.stats.messages_received, e
                    );
                    break Ok(Termination::PeerClosed {
                        after: self.stats.messages_received,
                    });
                }
                Err(e) => {
                    error!("Failed to receive response: {}", e);
                    break Err(e);
                }
            };

            match self.handle(Message::from_frame(frame)).await {
                Step::Continue => {}
                Step::Terminate(Termination::AiEnd) => {
                    break Ok(self.absorb_trailing(reader, &mut abort).await);
                }
                Step::Terminate(termination) => break Ok(termination),
            }
        };

        if self.audio_started {
            self.stop_playback().await;
        }
        // Response flag first, so a late press cannot re-raise abort
        self.controller.set_ai_response_active(false);
        self.controller.clear_abort();

        match &result {
            Ok(termination) => {
                info!("Response loop ended: {}", termination);
                self.stats.termination = Some(termination.to_string());
            }
            Err(e) => self.stats.termination = Some(format!("receive failed: {}", e)),
        }
        result
    }

    /// Handle messages that arrive shortly after AI_END
    async fn absorb_trailing<R>(
        &mut self,
        reader: &mut R,
        abort: &mut watch::Receiver<bool>,
    ) -> Termination
    where
        R: AsyncRead + Unpin,
    {
        let deadline = Instant::now() + self.settings.ai_end_grace;

        loop {
            let frame = tokio::select! {
                biased;
                _ = wait_for_abort(abort) => return Termination::Interrupted,
                _ = tokio::time::sleep_until(deadline) => break,
                frame = read_frame(reader, self.settings.read_limits) => frame,
            };

            let Ok(frame) = frame else {
                break;
            };

            debug!("Trailing {} after AI_END", frame.kind);
            match self.handle(Message::from_frame(frame)).await {
                Step::Continue | Step::Terminate(Termination::AiEnd) => {}
                Step::Terminate(termination) => return termination,
            }
        }

        Termination::AiEnd
    }
}

/// Resolves once the abort flag is raised
async fn wait_for_abort(abort: &mut watch::Receiver<bool>) {
    loop {
        if *abort.borrow_and_update() {
            return;
        }
        if abort.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}
