// Playback sink
//
// Owns the output device and applies the playback policy on top of the raw
// device primitives: idempotent setup, chunked submission with a bounded
// busy retry, occupancy reporting, drained teardown and the hard stop used
// for barge-in.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::device::{AudioFormat, AudioOutput, BufferHealth, ChannelStatus, DeviceError, OutputAttr};
use crate::interrupt::InterruptController;

/// Playback tuning
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Largest single device submission in bytes (default: 4096)
    pub play_chunk_size: usize,
    /// Attempts per chunk while the device reports busy (default: 3)
    pub busy_retry_limit: u32,
    /// Pause between busy attempts (default: 10ms)
    pub busy_retry_backoff: Duration,
    /// Wait per drain attempt during teardown (default: 1s)
    pub drain_timeout: Duration,
    /// Drain attempts before giving up (default: 1)
    pub drain_attempts: u32,
    /// Output volume, 0-100
    pub volume: u8,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            play_chunk_size: 4096,
            busy_retry_limit: 3,
            busy_retry_backoff: Duration::from_millis(10),
            drain_timeout: Duration::from_millis(1000),
            drain_attempts: 1,
            volume: 100,
        }
    }
}

/// Device lifecycle as seen by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Ready,
    Playing,
}

/// Result of a successful `play` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Every chunk was handed to the device
    Played { chunks: usize },
    /// Playback was no longer active; nothing was submitted
    Skipped,
    /// Playback stopped being active part way through
    Truncated { chunks: usize },
}

pub struct PlaybackSink {
    device: Box<dyn AudioOutput>,
    settings: SinkSettings,
    controller: Arc<InterruptController>,
    state: SinkState,
    format: Option<AudioFormat>,
    next_timestamp: u64,
}

impl PlaybackSink {
    pub fn new(
        device: Box<dyn AudioOutput>,
        settings: SinkSettings,
        controller: Arc<InterruptController>,
    ) -> Self {
        Self {
            device,
            settings,
            controller,
            state: SinkState::Uninitialized,
            format: None,
            next_timestamp: 0,
        }
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }

    /// Configure and enable the device for `format`
    ///
    /// Any existing device state is released first. A failing step releases
    /// whatever earlier steps acquired.
    pub fn setup(&mut self, format: AudioFormat) -> Result<(), DeviceError> {
        if self.state != SinkState::Uninitialized {
            info!("Playback already initialized, releasing before setup");
            self.release();
        }

        let attr = OutputAttr::with_format(format);
        info!(
            "Setting up playback on {}: {} Hz, {} ch, {} bit, {} frames x {} samples ({:.0} ms buffered)",
            self.device.name(),
            format.sample_rate,
            format.channels,
            format.bit_width,
            attr.frame_count,
            attr.samples_per_frame,
            attr.buffer_duration_ms()
        );

        if let Err(e) = self.device.set_attr(&attr) {
            error!("Failed to set output attributes: {}", e);
            return Err(e);
        }

        if let Err(e) = self.device.enable() {
            error!("Failed to enable output device: {}", e);
            return Err(e);
        }

        if let Err(e) = self.device.set_channel_params() {
            error!("Failed to set channel parameters: {}", e);
            self.disable_device();
            return Err(e);
        }

        if let Err(e) = self.device.enable_channel() {
            error!("Failed to enable output channel: {}", e);
            self.disable_device();
            return Err(e);
        }

        if let Err(e) = self.device.set_volume(self.settings.volume) {
            warn!("Failed to set volume to {}: {}", self.settings.volume, e);
        }

        self.state = SinkState::Ready;
        self.format = Some(format);
        self.next_timestamp = 0;
        info!("Playback ready");
        Ok(())
    }

    /// Submit PCM in `play_chunk_size` pieces, in order
    ///
    /// The active flag is checked before every chunk, so a barge-in takes
    /// effect within one chunk. A failed chunk does not stop the remaining
    /// ones; the last failure is returned after all chunks were attempted.
    pub fn play(&mut self, data: &[u8]) -> Result<PlayOutcome, DeviceError> {
        if data.is_empty() {
            return Ok(PlayOutcome::Played { chunks: 0 });
        }

        if !self.controller.is_playing() {
            debug!("Playback not active, skipping {} bytes", data.len());
            return Ok(PlayOutcome::Skipped);
        }

        if self.state == SinkState::Uninitialized {
            return Err(DeviceError::NotInitialized);
        }

        let chunk_size = self.settings.play_chunk_size.max(1);
        let total_chunks = data.len().div_ceil(chunk_size);
        if total_chunks > 1 {
            debug!("Splitting {} bytes into {} chunks", data.len(), total_chunks);
        }

        self.state = SinkState::Playing;
        let mut submitted = 0;
        let mut last_error = None;

        for (index, chunk) in data.chunks(chunk_size).enumerate() {
            if !self.controller.is_playing() {
                info!(
                    "Playback interrupted after {}/{} chunks",
                    index, total_chunks
                );
                self.state = SinkState::Ready;
                return Ok(PlayOutcome::Truncated { chunks: submitted });
            }

            match self.submit(chunk) {
                Ok(()) => submitted += 1,
                Err(e) => {
                    error!(
                        "Failed to play chunk {}/{} ({} bytes): {}",
                        index + 1,
                        total_chunks,
                        chunk.len(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        self.state = SinkState::Ready;
        match last_error {
            Some(e) => Err(e),
            None => Ok(PlayOutcome::Played { chunks: submitted }),
        }
    }

    fn submit(&mut self, chunk: &[u8]) -> Result<(), DeviceError> {
        let limit = self.settings.busy_retry_limit.max(1);
        let mut attempt = 1;

        loop {
            match self.device.send_frame(chunk, self.next_timestamp) {
                Ok(()) => {
                    self.next_timestamp += 1;
                    return Ok(());
                }
                Err(DeviceError::Busy) if attempt < limit => {
                    debug!("Device busy, retry {}/{}", attempt, limit);
                    attempt += 1;
                    thread::sleep(self.settings.busy_retry_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Report hardware queue occupancy, logging underrun risk
    pub fn query_status(&mut self) -> Result<ChannelStatus, DeviceError> {
        if self.state == SinkState::Uninitialized {
            return Err(DeviceError::NotInitialized);
        }

        let status = self.device.query_status()?;
        match status.health() {
            BufferHealth::Critical => {
                warn!("Playback buffer full: underrun imminent when input stalls")
            }
            BufferHealth::Warning => warn!("Playback buffer nearly full: 1 free frame"),
            BufferHealth::Caution => debug!("Playback buffer high: 2 free frames"),
            BufferHealth::Healthy => {}
        }
        debug!(
            "Playback queue: total={} free={} busy={} ({:.1}% used)",
            status.total,
            status.free,
            status.busy,
            status.usage_percent()
        );
        Ok(status)
    }

    /// Drain queued audio and disable the device
    ///
    /// The shared playing flag is cleared whatever happens.
    pub fn teardown(&mut self) -> Result<(), DeviceError> {
        let result = if self.state == SinkState::Uninitialized {
            debug!("Teardown with playback already released");
            Ok(())
        } else {
            self.drain();
            let channel = self.device.disable_channel();
            let device = self.device.disable();
            self.reset();

            if let Err(e) = &channel {
                error!("Failed to disable output channel: {}", e);
            }
            if let Err(e) = &device {
                error!("Failed to disable output device: {}", e);
            }
            info!("Playback torn down");
            channel.and(device)
        };

        self.controller.set_playing(false);
        result
    }

    fn drain(&mut self) {
        let attempts = self.settings.drain_attempts.max(1);
        for attempt in 1..=attempts {
            match self.device.wait_drained(self.settings.drain_timeout) {
                Ok(()) => return,
                Err(e) => warn!(
                    "Drain attempt {}/{} did not complete within {:?}: {}",
                    attempt, attempts, self.settings.drain_timeout, e
                ),
            }
        }
        warn!("Playback queue not drained, stopping anyway");
    }

    /// Stop the device immediately without draining
    ///
    /// Shared flags are left to the caller.
    pub fn hard_stop(&mut self) {
        if self.state == SinkState::Uninitialized {
            return;
        }
        info!("Hard stop of playback device");
        self.release();
    }

    fn release(&mut self) {
        if let Err(e) = self.device.disable_channel() {
            warn!("Failed to disable output channel: {}", e);
        }
        self.disable_device();
        self.reset();
    }

    fn disable_device(&mut self) {
        if let Err(e) = self.device.disable() {
            warn!("Failed to disable output device: {}", e);
        }
    }

    fn reset(&mut self) {
        self.state = SinkState::Uninitialized;
        self.format = None;
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Log {
        frames: Vec<Vec<u8>>,
        busy_left: u32,
        ops: Vec<&'static str>,
    }

    struct FakeOutput(Arc<Mutex<Log>>);

    impl AudioOutput for FakeOutput {
        fn name(&self) -> &str {
            "fake"
        }
        fn set_attr(&mut self, _: &OutputAttr) -> Result<(), DeviceError> {
            self.0.lock().unwrap().ops.push("set_attr");
            Ok(())
        }
        fn enable(&mut self) -> Result<(), DeviceError> {
            self.0.lock().unwrap().ops.push("enable");
            Ok(())
        }
        fn set_channel_params(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn enable_channel(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_volume(&mut self, _: u8) -> Result<(), DeviceError> {
            Ok(())
        }
        fn send_frame(&mut self, pcm: &[u8], _: u64) -> Result<(), DeviceError> {
            let mut log = self.0.lock().unwrap();
            if log.busy_left > 0 {
                log.busy_left -= 1;
                return Err(DeviceError::Busy);
            }
            log.frames.push(pcm.to_vec());
            Ok(())
        }
        fn query_status(&mut self) -> Result<ChannelStatus, DeviceError> {
            Ok(ChannelStatus { total: 8, free: 8, busy: 0 })
        }
        fn wait_drained(&mut self, _: Duration) -> Result<(), DeviceError> {
            self.0.lock().unwrap().ops.push("drain");
            Ok(())
        }
        fn disable_channel(&mut self) -> Result<(), DeviceError> {
            self.0.lock().unwrap().ops.push("disable_channel");
            Ok(())
        }
        fn disable(&mut self) -> Result<(), DeviceError> {
            self.0.lock().unwrap().ops.push("disable");
            Ok(())
        }
    }

    fn sink() -> (PlaybackSink, Arc<Mutex<Log>>, Arc<InterruptController>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let controller = Arc::new(InterruptController::new());
        let settings = SinkSettings {
            busy_retry_backoff: Duration::ZERO,
            ..SinkSettings::default()
        };
        let sink =
            PlaybackSink::new(Box::new(FakeOutput(log.clone())), settings, controller.clone());
        (sink, log, controller)
    }

    #[test]
    fn test_play_splits_in_order() {
        let (mut sink, log, controller) = sink();
        sink.setup(AudioFormat::default()).unwrap();
        controller.set_playing(true);

        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let outcome = sink.play(&data).unwrap();
        assert_eq!(outcome, PlayOutcome::Played { chunks: 3 });

        let frames = &log.lock().unwrap().frames;
        assert_eq!(frames.iter().map(Vec::len).collect::<Vec<_>>(), vec![4096, 4096, 1808]);
        assert_eq!(frames.concat(), data);
    }

    #[test]
    fn test_busy_retried_within_limit() {
        let (mut sink, log, controller) = sink();
        sink.setup(AudioFormat::default()).unwrap();
        controller.set_playing(true);

        log.lock().unwrap().busy_left = 2;
        assert_eq!(sink.play(&[1, 2]).unwrap(), PlayOutcome::Played { chunks: 1 });

        log.lock().unwrap().busy_left = 3;
        assert_eq!(sink.play(&[1, 2]), Err(DeviceError::Busy));
    }

    #[test]
    fn test_not_playing_skips() {
        let (mut sink, log, _controller) = sink();
        sink.setup(AudioFormat::default()).unwrap();

        assert_eq!(sink.play(&[0; 100]).unwrap(), PlayOutcome::Skipped);
        assert!(log.lock().unwrap().frames.is_empty());
    }

    #[test]
    fn test_hard_stop_skips_drain() {
        let (mut sink, log, _controller) = sink();
        sink.setup(AudioFormat::default()).unwrap();
        sink.hard_stop();

        assert_eq!(sink.state(), SinkState::Uninitialized);
        let ops = &log.lock().unwrap().ops;
        assert!(!ops.contains(&"drain"));
        assert!(ops.contains(&"disable_channel"));
    }

    #[test]
    fn test_setup_twice_releases_first() {
        let (mut sink, log, _controller) = sink();
        sink.setup(AudioFormat::default()).unwrap();
        sink.setup(AudioFormat::default()).unwrap();

        let ops = log.lock().unwrap().ops.clone();
        assert_eq!(
            ops,
            vec!["set_attr", "enable", "disable_channel", "disable", "set_attr", "enable"]
        );
    }
}
