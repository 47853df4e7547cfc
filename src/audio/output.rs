// Host output devices
//
// Stand-ins for the vendor audio output on machines without it: a WAV file
// writer and a device that discards everything.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::device::{AudioOutput, ChannelStatus, DeviceError, OutputAttr};

/// Status code reported for file I/O failures
const IO_FAILURE: i32 = -1;
/// Status code reported for formats the file writer cannot encode
const UNSUPPORTED_FORMAT: i32 = -2;

/// Writes submitted PCM (16-bit little endian) to a WAV file
///
/// Each `enable` starts a fresh file at the same path; the file is
/// finalized on `disable` or drop.
pub struct WavFileOutput {
    path: PathBuf,
    attr: Option<OutputAttr>,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    channel_enabled: bool,
    frames_written: u64,
}

impl WavFileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            attr: None,
            writer: None,
            channel_enabled: false,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finalize(&mut self) -> Result<(), DeviceError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| {
                warn!("Failed to finalize WAV file {:?}: {}", self.path, e);
                DeviceError::status("finalize", IO_FAILURE)
            })?;
            info!("Wrote {} frames to {:?}", self.frames_written, self.path);
        }
        Ok(())
    }
}

impl AudioOutput for WavFileOutput {
    fn name(&self) -> &str {
        "wav-file"
    }

    fn set_attr(&mut self, attr: &OutputAttr) -> Result<(), DeviceError> {
        if attr.format.bit_width != 16 {
            warn!("WAV output supports 16-bit PCM only, got {}", attr.format.bit_width);
            return Err(DeviceError::status("set_attr", UNSUPPORTED_FORMAT));
        }
        self.attr = Some(*attr);
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        let attr = self.attr.ok_or(DeviceError::NotInitialized)?;
        self.finalize()?;

        let spec = hound::WavSpec {
            channels: attr.format.channels,
            sample_rate: attr.format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&self.path, spec).map_err(|e| {
            warn!("Failed to create WAV file {:?}: {}", self.path, e);
            DeviceError::status("enable", IO_FAILURE)
        })?;

        self.writer = Some(writer);
        self.frames_written = 0;
        debug!("WAV output enabled at {:?}", self.path);
        Ok(())
    }

    fn set_channel_params(&mut self) -> Result<(), DeviceError> {
        if self.writer.is_none() {
            return Err(DeviceError::NotInitialized);
        }
        Ok(())
    }

    fn enable_channel(&mut self) -> Result<(), DeviceError> {
        if self.writer.is_none() {
            return Err(DeviceError::NotInitialized);
        }
        self.channel_enabled = true;
        Ok(())
    }

    fn set_volume(&mut self, _volume: u8) -> Result<(), DeviceError> {
        Ok(())
    }

    fn send_frame(&mut self, pcm: &[u8], _timestamp: u64) -> Result<(), DeviceError> {
        if !self.channel_enabled {
            return Err(DeviceError::NotInitialized);
        }
        let writer = self.writer.as_mut().ok_or(DeviceError::NotInitialized)?;

        if pcm.len() % 2 != 0 {
            debug!("Odd-length PCM frame ({} bytes), trailing byte dropped", pcm.len());
        }

        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|_| DeviceError::status("send_frame", IO_FAILURE))?;
        }

        self.frames_written += 1;
        Ok(())
    }

    fn query_status(&mut self) -> Result<ChannelStatus, DeviceError> {
        let total = self.attr.map(|a| a.frame_count).unwrap_or(0);
        // Writes complete synchronously, so the queue is always empty
        Ok(ChannelStatus { total, free: total, busy: 0 })
    }

    fn wait_drained(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        match self.writer.as_mut() {
            Some(writer) => writer
                .flush()
                .map_err(|_| DeviceError::status("wait_drained", IO_FAILURE)),
            None => Ok(()),
        }
    }

    fn disable_channel(&mut self) -> Result<(), DeviceError> {
        self.channel_enabled = false;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        self.channel_enabled = false;
        self.finalize()
    }
}

impl Drop for WavFileOutput {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}

/// Accepts and discards every frame
#[derive(Debug, Default)]
pub struct NullOutput {
    frames: u64,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioOutput for NullOutput {
    fn name(&self) -> &str {
        "null"
    }

    fn set_attr(&mut self, _attr: &OutputAttr) -> Result<(), DeviceError> {
        Ok(())
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_channel_params(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn enable_channel(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_volume(&mut self, _volume: u8) -> Result<(), DeviceError> {
        Ok(())
    }

    fn send_frame(&mut self, _pcm: &[u8], _timestamp: u64) -> Result<(), DeviceError> {
        self.frames += 1;
        Ok(())
    }

    fn query_status(&mut self) -> Result<ChannelStatus, DeviceError> {
        Ok(ChannelStatus { total: 8, free: 8, busy: 0 })
    }

    fn wait_drained(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        Ok(())
    }

    fn disable_channel(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        debug!("Null output discarded {} frames", self.frames);
        Ok(())
    }
}
