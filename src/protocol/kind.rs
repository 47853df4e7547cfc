use std::fmt;

/// Message kind carried in the first header byte
///
/// Wire values outside the known set decode to `Unrecognized` so that newer
/// servers never abort an older client's receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    VoiceStart,
    VoiceData,
    VoiceEnd,
    TextData,
    AudioData,
    AiStart,
    AiEnd,
    AudioStart,
    AudioEnd,
    Error,
    AiCancelled,
    JsonResponse,
    Config,
    AiNewChat,
    Unrecognized(u8),
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x01 => Self::VoiceStart,
            0x02 => Self::VoiceData,
            0x03 => Self::VoiceEnd,
            0x04 => Self::TextData,
            0x05 => Self::AudioData,
            0x06 => Self::AiStart,
            0x07 => Self::AiEnd,
            0x08 => Self::AudioStart,
            0x09 => Self::AudioEnd,
            0x0A => Self::Error,
            0x0B => Self::AiCancelled,
            0x0C => Self::JsonResponse,
            0x0D => Self::Config,
            0x0E => Self::AiNewChat,
            other => Self::Unrecognized(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::VoiceStart => 0x01,
            Self::VoiceData => 0x02,
            Self::VoiceEnd => 0x03,
            Self::TextData => 0x04,
            Self::AudioData => 0x05,
            Self::AiStart => 0x06,
            Self::AiEnd => 0x07,
            Self::AudioStart => 0x08,
            Self::AudioEnd => 0x09,
            Self::Error => 0x0A,
            Self::AiCancelled => 0x0B,
            Self::JsonResponse => 0x0C,
            Self::Config => 0x0D,
            Self::AiNewChat => 0x0E,
            Self::Unrecognized(byte) => byte,
        }
    }

    /// Kinds that reset the receive loop's non-progress counter
    pub fn is_progress(self) -> bool {
        matches!(
            self,
            Self::AudioData | Self::TextData | Self::AiStart | Self::AudioStart
        )
    }

    /// Short uppercase name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::VoiceStart => "VOICE_START",
            Self::VoiceData => "VOICE_DATA",
            Self::VoiceEnd => "VOICE_END",
            Self::TextData => "TEXT_DATA",
            Self::AudioData => "AUDIO_DATA",
            Self::AiStart => "AI_START",
            Self::AiEnd => "AI_END",
            Self::AudioStart => "AUDIO_START",
            Self::AudioEnd => "AUDIO_END",
            Self::Error => "ERROR",
            Self::AiCancelled => "AI_CANCELLED",
            Self::JsonResponse => "JSON_RESPONSE",
            Self::Config => "CONFIG",
            Self::AiNewChat => "AI_NEWCHAT",
            Self::Unrecognized(_) => "UNRECOGNIZED",
        }
    }
}

impl From<u8> for MessageKind {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

impl From<MessageKind> for u8 {
    fn from(kind: MessageKind) -> Self {
        kind.as_byte()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), self.as_byte())
    }
}
