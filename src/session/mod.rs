//! Voice request/response sessions
//!
//! A session covers one exchange over one connection:
//! - Connect and negotiate the response format (CONFIG)
//! - Upload the recording (VOICE_START, VOICE_DATA*, VOICE_END)
//! - Run the response loop until a terminal message
//! - Collect timing statistics

mod config;
mod session;
pub mod stats;

pub use config::SessionConfig;
pub use session::{SessionReport, VoiceSession};
pub use stats::SessionStats;
