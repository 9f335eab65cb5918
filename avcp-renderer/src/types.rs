//! Value types shared by sessions and renderers
//!
//! Device-reported enumerations keep the raw string when it is not one of
//! the values the UPnP AV specification defines, so vendor extensions are
//! reported rather than dropped.

use std::fmt;

/// Device-assigned connection id, unique among live connections on a device
pub type ConnectionId = i32;

/// The connection id devices use when they do not support negotiation
pub const DEFAULT_CONNECTION_ID: ConnectionId = 0;

/// Caller-supplied correlation value echoed back in renderer events
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTag(String);

impl RequestTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl From<String> for RequestTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport state (`TransportState`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayState {
    Playing,
    Recording,
    Seeking,
    Stopped,
    Paused,
    Transitioning,
    Unknown(String),
}

impl PlayState {
    pub fn from_upnp(value: &str) -> Self {
        match value.trim() {
            "PLAYING" => PlayState::Playing,
            "RECORDING" => PlayState::Recording,
            "SEEKING" => PlayState::Seeking,
            "STOPPED" | "NO_MEDIA_PRESENT" => PlayState::Stopped,
            "PAUSED_PLAYBACK" | "PAUSED_RECORDING" => PlayState::Paused,
            "TRANSITIONING" => PlayState::Transitioning,
            other => PlayState::Unknown(other.to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayState::Playing)
    }
}

/// Play mode (`CurrentPlayMode`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayMode {
    Normal,
    Intro,
    Direct1,
    Shuffle,
    Random,
    RepeatOne,
    RepeatAll,
    Unknown(String),
}

impl PlayMode {
    pub fn from_upnp(value: &str) -> Self {
        match value.trim() {
            "NORMAL" => PlayMode::Normal,
            "INTRO" => PlayMode::Intro,
            "DIRECT_1" => PlayMode::Direct1,
            "SHUFFLE" => PlayMode::Shuffle,
            "RANDOM" => PlayMode::Random,
            "REPEAT_ONE" => PlayMode::RepeatOne,
            "REPEAT_ALL" => PlayMode::RepeatAll,
            other => PlayMode::Unknown(other.to_string()),
        }
    }

    /// The wire value for `SetPlayMode`
    pub fn as_upnp(&self) -> &str {
        match self {
            PlayMode::Normal => "NORMAL",
            PlayMode::Intro => "INTRO",
            PlayMode::Direct1 => "DIRECT_1",
            PlayMode::Shuffle => "SHUFFLE",
            PlayMode::Random => "RANDOM",
            PlayMode::RepeatOne => "REPEAT_ONE",
            PlayMode::RepeatAll => "REPEAT_ALL",
            PlayMode::Unknown(raw) => raw,
        }
    }
}

/// RenderingControl channel
///
/// Operations take `Option<Channel>`; `None` addresses `Master`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    #[default]
    Master,
    LeftFront,
    RightFront,
    CenterFront,
    Lfe,
    LeftSurround,
    RightSurround,
    Unknown(String),
}

impl Channel {
    pub fn from_upnp(value: &str) -> Self {
        match value.trim() {
            "" | "Master" => Channel::Master,
            "LF" => Channel::LeftFront,
            "RF" => Channel::RightFront,
            "CF" => Channel::CenterFront,
            "LFE" => Channel::Lfe,
            "LS" => Channel::LeftSurround,
            "RS" => Channel::RightSurround,
            other => Channel::Unknown(other.to_string()),
        }
    }

    pub fn as_upnp(&self) -> &str {
        match self {
            Channel::Master => "Master",
            Channel::LeftFront => "LF",
            Channel::RightFront => "RF",
            Channel::CenterFront => "CF",
            Channel::Lfe => "LFE",
            Channel::LeftSurround => "LS",
            Channel::RightSurround => "RS",
            Channel::Unknown(raw) => raw,
        }
    }

    /// Resolve an optional channel argument
    pub fn or_master(channel: Option<Channel>) -> Channel {
        channel.unwrap_or_default()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upnp())
    }
}
