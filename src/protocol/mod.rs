//! Wire protocol spoken with the inference server
//!
//! Every unit on the socket is a frame: a 1-byte message kind, a 4-byte
//! big-endian payload length, then exactly that many payload bytes.

pub mod codec;
pub mod error;
pub mod kind;
pub mod message;

pub use codec::{encode, read_frame, write_frame, Frame, ReadLimits, HEADER_LEN};
pub use error::FrameError;
pub use kind::MessageKind;
pub use message::{AudioPayload, ConfigPayload, Message, ResponseFormat, AUDIO_END_MARKER};
