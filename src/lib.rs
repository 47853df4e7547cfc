pub mod audio;
pub mod config;
pub mod dispatch;
pub mod interrupt;
pub mod protocol;
pub mod session;

pub use audio::{
    AssemblyBuffer, AssemblyEvent, AudioFormat, AudioOutput, ChannelStatus, DeviceError,
    FileVoiceSource, MemoryVoiceSource, NullOutput, PlayOutcome, PlaybackHandle, PlaybackSink,
    PlaybackWorker, SinkSettings, VoiceSource, WavFileOutput,
};
pub use config::ClientConfig;
pub use dispatch::{DispatchSettings, Dispatcher, ResponseEvent, Termination};
pub use interrupt::{ButtonEvent, DebugfsGpio, GpioMonitor, InterruptController};
pub use protocol::{Frame, FrameError, Message, MessageKind, ResponseFormat};
pub use session::{SessionConfig, SessionReport, SessionStats, VoiceSession};
