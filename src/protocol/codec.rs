use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::FrameError;
use super::kind::MessageKind;

/// Header size: 1 byte kind + 4 bytes big-endian length
pub const HEADER_LEN: usize = 5;

/// Receive window applied before each header read
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest payload the client accepts (640 KiB)
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 640 * 1024;

/// One length-prefixed protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Frame with an empty payload (VOICE_START, AUDIO_END, ...)
    pub fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            payload: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Limits applied to every receive
#[derive(Debug, Clone, Copy)]
pub struct ReadLimits {
    /// Frames declaring more than this are rejected, never truncated
    pub max_payload_len: u32,
    /// Readiness window before the header read
    pub timeout: Duration,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

pub fn encode_header(kind: MessageKind, len: u32) -> [u8; HEADER_LEN] {
    let len = len.to_be_bytes();
    [kind.as_byte(), len[0], len[1], len[2], len[3]]
}

pub fn parse_header(header: &[u8; HEADER_LEN]) -> (MessageKind, u32) {
    let kind = MessageKind::from_byte(header[0]);
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    (kind, len)
}

/// Build header + payload. No padding, no escaping.
pub fn encode(kind: MessageKind, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::Unencodable(payload.len()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&encode_header(kind, len));
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Send one frame and flush it
pub async fn write_frame<W>(
    writer: &mut W,
    kind: MessageKind,
    payload: &[u8],
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode(kind, payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    debug!("Sent {} ({} bytes)", kind, payload.len());

    Ok(())
}

/// Receive exactly one frame
///
/// The first header byte is awaited under `limits.timeout`; the remaining
/// header and the payload must then arrive in full within the same window
/// each, otherwise the receive fails. An oversized declared length is
/// rejected before any payload byte is read.
pub async fn read_frame<R>(reader: &mut R, limits: ReadLimits) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];

    let first = timeout(limits.timeout, reader.read(&mut header[..1]))
        .await
        .map_err(|_| FrameError::Timeout(limits.timeout))??;
    if first == 0 {
        return Err(FrameError::PeerClosed);
    }

    let rest = timeout(limits.timeout, read_full(reader, &mut header[1..]))
        .await
        .map_err(|_| FrameError::Timeout(limits.timeout))??;
    if rest < HEADER_LEN - 1 {
        return Err(FrameError::PartialHeader { received: 1 + rest });
    }

    let (kind, len) = parse_header(&header);
    if len > limits.max_payload_len {
        warn!(
            "Rejecting {}: declared {} bytes exceeds capacity {}",
            kind, len, limits.max_payload_len
        );
        return Err(FrameError::PayloadTooLarge {
            len,
            max: limits.max_payload_len,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        let received = timeout(limits.timeout, read_full(reader, &mut payload))
            .await
            .map_err(|_| FrameError::Timeout(limits.timeout))??;
        if received < payload.len() {
            return Err(FrameError::ShortPayload {
                expected: len,
                received,
            });
        }
    }

    debug!("Received {} ({} bytes)", kind, len);

    Ok(Frame { kind, payload })
}

/// Read until `buf` is full or the stream ends; returns bytes read
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
