// Audio assembly buffer
//
// Turns a stream of variably sized AUDIO_DATA payloads into playback-sized
// writes. Small payloads are accumulated, large ones bypass the buffer, and
// the in-band end marker flushes whatever has been collected so far.

use tracing::{debug, warn};

use crate::protocol::AudioPayload;

/// Default capacity (640 KiB)
pub const DEFAULT_ASSEMBLY_CAPACITY: usize = 640 * 1024;

/// Something the playback path should do after a push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyEvent {
    /// Accumulated segment, in arrival order
    Flush(Vec<u8>),
    /// Large payload played without buffering
    Direct(Vec<u8>),
    /// Payload could not be buffered even into an empty buffer; dropped
    Unplayable(usize),
}

/// Capacity-capped accumulation buffer
///
/// Fill level never exceeds `capacity`: a payload that does not fit forces a
/// flush of the current contents before it is appended.
#[derive(Debug)]
pub struct AssemblyBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Payloads strictly larger than this bypass buffering (None = never)
    bypass_threshold: Option<usize>,
}

impl Default for AssemblyBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_ASSEMBLY_CAPACITY)
    }
}

impl AssemblyBuffer {
    /// Buffer whose bypass threshold is half its capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            bypass_threshold: Some(capacity / 2),
        }
    }

    /// Override the large-payload threshold
    pub fn with_bypass_threshold(mut self, threshold: Option<usize>) -> Self {
        self.bypass_threshold = threshold;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Drop buffered audio without playing it
    pub fn clear(&mut self) {
        if !self.data.is_empty() {
            debug!("Discarding {} buffered audio bytes", self.data.len());
        }
        self.data.clear();
    }

    /// Take the buffered segment, leaving the buffer empty
    pub fn take(&mut self) -> Option<Vec<u8>> {
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }

    /// Apply the buffering policy to one AUDIO_DATA payload
    ///
    /// Returned events must be played in order.
    pub fn push(&mut self, payload: AudioPayload) -> Vec<AssemblyEvent> {
        let mut events = Vec::new();

        let bytes = match payload {
            AudioPayload::EndMarker => {
                debug!("Audio end marker, {} bytes buffered", self.data.len());
                if let Some(segment) = self.take() {
                    events.push(AssemblyEvent::Flush(segment));
                }
                return events;
            }
            AudioPayload::Pcm(bytes) => bytes,
        };

        if bytes.is_empty() {
            return events;
        }

        if let Some(threshold) = self.bypass_threshold {
            if bytes.len() > threshold {
                debug!(
                    "Large audio payload ({} > {} bytes), playing directly",
                    bytes.len(),
                    threshold
                );
                events.push(AssemblyEvent::Direct(bytes));
                return events;
            }
        }

        if bytes.len() <= self.remaining() {
            self.data.extend_from_slice(&bytes);
            return events;
        }

        // Does not fit: flush what we have, then start over
        if let Some(segment) = self.take() {
            debug!("Assembly buffer full, flushing {} bytes", segment.len());
            events.push(AssemblyEvent::Flush(segment));
        }

        if bytes.len() <= self.capacity {
            self.data.extend_from_slice(&bytes);
        } else {
            warn!(
                "Audio payload too large to buffer: {} > {} bytes, dropping",
                bytes.len(),
                self.capacity
            );
            events.push(AssemblyEvent::Unplayable(bytes.len()));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AUDIO_END_MARKER;

    fn pcm(len: usize) -> AudioPayload {
        AudioPayload::Pcm(vec![0x11; len])
    }

    #[test]
    fn test_small_payloads_accumulate() {
        let mut buffer = AssemblyBuffer::new(100);

        assert!(buffer.push(pcm(20)).is_empty());
        assert!(buffer.push(pcm(30)).is_empty());
        assert_eq!(buffer.len(), 50);
        assert_eq!(buffer.remaining(), 50);
    }

    #[test]
    fn test_end_marker_flushes_and_is_never_buffered() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(10));

        let events = buffer.push(AudioPayload::EndMarker);
        assert_eq!(events, vec![AssemblyEvent::Flush(vec![0x11; 10])]);
        assert!(buffer.is_empty());

        // Empty buffer: marker is a no-op
        assert!(buffer.push(AudioPayload::EndMarker).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_marker_bytes_from_wire_flush() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(4));

        let events = buffer.push(AudioPayload::from_bytes(AUDIO_END_MARKER.to_vec()));
        assert_eq!(events.len(), 1);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_large_payload_bypasses_buffer() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(10));

        let events = buffer.push(pcm(51));
        assert_eq!(events, vec![AssemblyEvent::Direct(vec![0x11; 51])]);
        // Buffered fragment is left in place
        assert_eq!(buffer.len(), 10);
    }

    #[test]
    fn test_exactly_half_capacity_is_buffered() {
        let mut buffer = AssemblyBuffer::new(100);
        assert!(buffer.push(pcm(50)).is_empty());
        assert_eq!(buffer.len(), 50);
    }

    #[test]
    fn test_overflow_flushes_then_refills() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(40));
        buffer.push(pcm(40));

        let events = buffer.push(AudioPayload::Pcm(vec![0x22; 30]));
        assert_eq!(events, vec![AssemblyEvent::Flush(vec![0x11; 80])]);
        assert_eq!(buffer.len(), 30);
    }

    #[test]
    fn test_exact_fill_is_allowed() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(50));
        assert!(buffer.push(pcm(50)).is_empty());
        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.remaining(), 0);
    }

    #[test]
    fn test_unplayable_without_bypass() {
        let mut buffer = AssemblyBuffer::new(100).with_bypass_threshold(None);
        buffer.push(pcm(10));

        let events = buffer.push(pcm(150));
        assert_eq!(
            events,
            vec![AssemblyEvent::Flush(vec![0x11; 10]), AssemblyEvent::Unplayable(150)]
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_discards() {
        let mut buffer = AssemblyBuffer::new(100);
        buffer.push(pcm(10));
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.take().is_none());
    }
}
