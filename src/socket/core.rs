use thiserror::Error;

use crate::parsing::tags::ChatMessage;

pub type ChannelResult<T> = core::result::Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("websocket client error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("channel transport is closed")]
    ConnectionClosed,
}

/// Connection phases, in the order a healthy connection walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Authenticating,
    AwaitingCapabilities,
    Joining,
    SteadyState,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Joined {
        channel: String,
    },
    /// One per name listed in a name-list reply
    ViewerPresent {
        login: String,
    },
    ViewerJoined {
        login: String,
    },
    ViewerParted {
        login: String,
    },
    Chat(ChatMessage),
    UserNotice {
        kind: Option<String>,
        system_message: Option<String>,
        chat: Option<ChatMessage>,
    },
    MessageDeleted {
        target_message_id: String,
        login: Option<String>,
    },
    /// `target` is `None` when the whole chat was cleared
    ChatCleared {
        target: Option<String>,
    },
    AuthenticationDenied {
        notice: String,
    },
    ReconnectRequested,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub token: String,
    pub login: String,
    pub channel: String,
}

impl Credentials {
    /// `channel` may be given with or without its leading `#`
    pub fn new(token: &str, login: &str, channel: &str) -> Self {
        Self {
            token: token.trim_start_matches("oauth:").to_string(),
            login: login.to_lowercase(),
            channel: channel.trim_start_matches('#').to_lowercase(),
        }
    }

    pub fn pass(&self) -> String {
        format!("PASS oauth:{}", self.token)
    }

    pub fn nick(&self) -> String {
        format!("NICK {}", self.login)
    }

    pub fn room(&self) -> String {
        format!("#{}", self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_normalize() {
        let creds = Credentials::new("oauth:abc123", "OverlayBot", "#SomeChannel");

        assert_eq!(creds.pass(), "PASS oauth:abc123");
        assert_eq!(creds.nick(), "NICK overlaybot");
        assert_eq!(creds.room(), "#somechannel");
    }
}
