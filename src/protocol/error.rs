use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single frame send or receive
///
/// None of these are retried by the codec; the receive loop decides whether
/// a failure ends the session or counts as a graceful close.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Nothing became readable within the receive window
    #[error("no data within {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection before the first header byte
    #[error("peer closed the connection")]
    PeerClosed,

    /// Connection ended in the middle of a header
    #[error("partial header: {received}/5 bytes")]
    PartialHeader { received: usize },

    /// Declared length exceeds the receive capacity
    #[error("payload too large: {len} > {max}")]
    PayloadTooLarge { len: u32, max: u32 },

    /// Connection ended before the declared payload arrived
    #[error("short payload: {received}/{expected} bytes")]
    ShortPayload { expected: u32, received: usize },

    /// Payload cannot be described by a 4-byte length
    #[error("payload of {0} bytes does not fit the length field")]
    Unencodable(usize),

    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }
}
