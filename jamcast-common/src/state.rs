//! Playback state shared between server and client

use serde::{Deserialize, Serialize};

/// Playback state of the broadcast session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Wrapper {
        state: PlaybackState,
    }

    #[test]
    fn test_display() {
        assert_eq!(PlaybackState::Stopped.to_string(), "stopped");
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_serializes_lowercase() {
        let text = toml::to_string(&Wrapper { state: PlaybackState::Paused }).unwrap();
        assert_eq!(text.trim(), "state = \"paused\"");
    }
}
