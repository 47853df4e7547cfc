use std::time::Duration;
use thiserror::Error;

/// PCM layout handed to the output device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample
    pub bit_width: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 8000, // Typical TTS output rate
            channels: 1,
            bit_width: 16,
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_frame(&self) -> usize {
        (self.bit_width as usize / 8) * self.channels as usize
    }

    /// Playback duration of `bytes` of PCM in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_frame() * self.sample_rate as usize;
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }
}

/// Device attributes applied at setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputAttr {
    pub format: AudioFormat,
    /// Hardware queue depth in frames
    pub frame_count: u32,
    /// Samples per hardware frame
    pub samples_per_frame: u32,
}

impl OutputAttr {
    /// Buffering deep enough to ride out network jitter without underrun
    pub fn with_format(format: AudioFormat) -> Self {
        Self {
            format,
            frame_count: 8,
            samples_per_frame: 409_600,
        }
    }

    pub fn buffered_samples(&self) -> u64 {
        self.frame_count as u64 * self.samples_per_frame as u64
    }

    pub fn buffer_duration_ms(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.buffered_samples() as f64 / self.format.sample_rate as f64 * 1000.0
    }
}

/// Occupancy of the hardware playback queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub total: u32,
    pub free: u32,
    pub busy: u32,
}

/// Underrun risk derived from free queue slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferHealth {
    /// No free slots
    Critical,
    /// One free slot
    Warning,
    /// Two free slots
    Caution,
    Healthy,
}

impl ChannelStatus {
    pub fn health(&self) -> BufferHealth {
        match self.free {
            0 => BufferHealth::Critical,
            1 => BufferHealth::Warning,
            2 => BufferHealth::Caution,
            _ => BufferHealth::Healthy,
        }
    }

    pub fn usage_percent(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.busy as f32 / self.total as f32 * 100.0
    }
}

/// Output device failure carrying the device status code
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// Queue temporarily full; the only retryable condition
    #[error("device busy")]
    Busy,

    #[error("playback device not initialized")]
    NotInitialized,

    #[error("{op} failed with status 0x{code:X}")]
    Status { op: &'static str, code: i32 },

    #[error("playback worker is not running")]
    WorkerGone,
}

impl DeviceError {
    pub fn status(op: &'static str, code: i32) -> Self {
        Self::Status { op, code }
    }
}

/// Audio output device primitives
///
/// Implementations wrap a vendor output API. All calls block; the playback
/// worker thread is the only caller.
pub trait AudioOutput: Send {
    /// Device name for logging
    fn name(&self) -> &str;

    fn set_attr(&mut self, attr: &OutputAttr) -> Result<(), DeviceError>;

    fn enable(&mut self) -> Result<(), DeviceError>;

    fn set_channel_params(&mut self) -> Result<(), DeviceError>;

    fn enable_channel(&mut self) -> Result<(), DeviceError>;

    fn set_volume(&mut self, volume: u8) -> Result<(), DeviceError>;

    /// Blocking handoff of one PCM frame to the hardware queue
    fn send_frame(&mut self, pcm: &[u8], timestamp: u64) -> Result<(), DeviceError>;

    fn query_status(&mut self) -> Result<ChannelStatus, DeviceError>;

    /// Wait for queued audio to finish playing
    fn wait_drained(&mut self, timeout: Duration) -> Result<(), DeviceError>;

    fn disable_channel(&mut self) -> Result<(), DeviceError>;

    fn disable(&mut self) -> Result<(), DeviceError>;
}
