//! Audio playback path
//!
//! - `device`: output device contract and its status types
//! - `assembly`: turns AUDIO_DATA payloads into playback-sized segments
//! - `sink`: playback policy on top of the device (chunking, retry, drain)
//! - `worker`: single thread owning the device, with an async handle
//! - `output`: host devices (WAV file, null)
//! - `source`: recorded voice to upload

pub mod assembly;
pub mod device;
pub mod output;
pub mod sink;
pub mod source;
pub mod worker;

pub use assembly::{AssemblyBuffer, AssemblyEvent, DEFAULT_ASSEMBLY_CAPACITY};
pub use device::{AudioFormat, AudioOutput, BufferHealth, ChannelStatus, DeviceError, OutputAttr};
pub use output::{NullOutput, WavFileOutput};
pub use sink::{PlayOutcome, PlaybackSink, SinkSettings, SinkState};
pub use source::{FileVoiceSource, MemoryVoiceSource, VoiceSource, DEFAULT_VOICE_CHUNK_SIZE};
pub use worker::{PlaybackHandle, PlaybackStopper, PlaybackWorker};
