use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::codec::Frame;
use super::kind::MessageKind;

/// In-band segment boundary carried inside AUDIO_DATA
pub const AUDIO_END_MARKER: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];

/// How the server should shape its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Single JSON_RESPONSE ends the exchange
    #[default]
    Json,
    /// Text and audio are streamed until AI_END
    Stream,
}

impl ResponseFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "stream" => Ok(Self::Stream),
            other => anyhow::bail!("Unknown response format '{}', expected json or stream", other),
        }
    }
}

/// Payload of the CONFIG frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    pub response_format: ResponseFormat,
}

impl ConfigPayload {
    pub fn new(response_format: ResponseFormat) -> Self {
        Self { response_format }
    }
}

/// Contents of an AUDIO_DATA frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPayload {
    /// Raw PCM to be played
    Pcm(Vec<u8>),
    /// Flush boundary; never played
    EndMarker,
}

impl AudioPayload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.as_slice() == AUDIO_END_MARKER {
            Self::EndMarker
        } else {
            Self::Pcm(bytes)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Pcm(bytes) => bytes.len(),
            Self::EndMarker => AUDIO_END_MARKER.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded frame, one variant per message kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    VoiceStart,
    VoiceData(Vec<u8>),
    VoiceEnd,
    Text(String),
    Audio(AudioPayload),
    AiStart,
    AiEnd,
    AudioStart,
    AudioEnd,
    Error(String),
    AiCancelled,
    JsonResponse(String),
    Config(String),
    AiNewChat,
    Unrecognized { kind: u8, payload: Vec<u8> },
}

impl Message {
    /// Interpret a received frame
    ///
    /// Text-bearing kinds are decoded lossily; payloads of marker kinds
    /// (AI_START, AUDIO_END, ...) are ignored.
    pub fn from_frame(frame: Frame) -> Self {
        let Frame { kind, payload } = frame;
        match kind {
            MessageKind::VoiceStart => Self::VoiceStart,
            MessageKind::VoiceData => Self::VoiceData(payload),
            MessageKind::VoiceEnd => Self::VoiceEnd,
            MessageKind::TextData => Self::Text(lossy(payload)),
            MessageKind::AudioData => Self::Audio(AudioPayload::from_bytes(payload)),
            MessageKind::AiStart => Self::AiStart,
            MessageKind::AiEnd => Self::AiEnd,
            MessageKind::AudioStart => Self::AudioStart,
            MessageKind::AudioEnd => Self::AudioEnd,
            MessageKind::Error => Self::Error(lossy(payload)),
            MessageKind::AiCancelled => Self::AiCancelled,
            MessageKind::JsonResponse => Self::JsonResponse(lossy(payload)),
            MessageKind::Config => Self::Config(lossy(payload)),
            MessageKind::AiNewChat => Self::AiNewChat,
            MessageKind::Unrecognized(kind) => Self::Unrecognized { kind, payload },
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::VoiceStart => MessageKind::VoiceStart,
            Self::VoiceData(_) => MessageKind::VoiceData,
            Self::VoiceEnd => MessageKind::VoiceEnd,
            Self::Text(_) => MessageKind::TextData,
            Self::Audio(_) => MessageKind::AudioData,
            Self::AiStart => MessageKind::AiStart,
            Self::AiEnd => MessageKind::AiEnd,
            Self::AudioStart => MessageKind::AudioStart,
            Self::AudioEnd => MessageKind::AudioEnd,
            Self::Error(_) => MessageKind::Error,
            Self::AiCancelled => MessageKind::AiCancelled,
            Self::JsonResponse(_) => MessageKind::JsonResponse,
            Self::Config(_) => MessageKind::Config,
            Self::AiNewChat => MessageKind::AiNewChat,
            Self::Unrecognized { kind, .. } => MessageKind::Unrecognized(*kind),
        }
    }

    pub fn into_frame(self) -> Frame {
        let kind = self.kind();
        let payload = match self {
            Self::VoiceData(bytes) => bytes,
            Self::Audio(AudioPayload::Pcm(bytes)) => bytes,
            Self::Audio(AudioPayload::EndMarker) => AUDIO_END_MARKER.to_vec(),
            Self::Text(text)
            | Self::Error(text)
            | Self::JsonResponse(text)
            | Self::Config(text) => text.into_bytes(),
            Self::Unrecognized { payload, .. } => payload,
            _ => Vec::new(),
        };
        Frame { kind, payload }
    }
}

fn lossy(payload: Vec<u8>) -> String {
    match String::from_utf8(payload) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_marker_detected_by_exact_match() {
        let marker =
            Message::from_frame(Frame::new(MessageKind::AudioData, AUDIO_END_MARKER.to_vec()));
        assert_eq!(marker, Message::Audio(AudioPayload::EndMarker));
    }

    #[test]
    fn test_marker_prefix_is_audio() {
        // Same bytes plus one more is ordinary PCM
        let mut bytes = AUDIO_END_MARKER.to_vec();
        bytes.push(0);
        let msg = Message::from_frame(Frame::new(MessageKind::AudioData, bytes.clone()));
        assert_eq!(msg, Message::Audio(AudioPayload::Pcm(bytes)));

        let short = AUDIO_END_MARKER[..7].to_vec();
        let msg = Message::from_frame(Frame::new(MessageKind::AudioData, short.clone()));
        assert_eq!(msg, Message::Audio(AudioPayload::Pcm(short)));
    }

    #[test]
    fn test_invalid_utf8_text_is_lossy() {
        let msg = Message::from_frame(Frame::new(MessageKind::TextData, vec![b'h', 0xFF, b'i']));
        match msg {
            Message::Text(text) => assert_eq!(text, "h\u{FFFD}i"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_keeps_payload() {
        let msg = Message::from_frame(Frame::new(MessageKind::from_byte(0x30), vec![1, 2]));
        assert_eq!(msg.kind(), MessageKind::Unrecognized(0x30));
        assert_eq!(msg.into_frame().payload, vec![1, 2]);
    }

    #[test]
    fn test_config_payload_json() {
        let json = serde_json::to_string(&ConfigPayload::new(ResponseFormat::Stream)).unwrap();
        assert_eq!(json, r#"{"response_format":"stream"}"#);

        let parsed: ConfigPayload = serde_json::from_str(r#"{"response_format": "json"}"#).unwrap();
        assert_eq!(parsed.response_format, ResponseFormat::Json);
    }

    #[test]
    fn test_response_format_parse() {
        assert_eq!("JSON".parse::<ResponseFormat>().unwrap(), ResponseFormat::Json);
        assert_eq!("stream".parse::<ResponseFormat>().unwrap(), ResponseFormat::Stream);
        assert!("xml".parse::<ResponseFormat>().is_err());
    }
}
