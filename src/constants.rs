pub const IRC_WEBSOCKET_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
pub const API_HELIX_URL: &str = "https://api.twitch.tv/helix";
pub const EMOTE_CDN_URL: &str = "https://static-cdn.jtvnw.net/emoticons/v2";

pub const DEFAULT_COMMANDS_PATH: &str = "commands.json";
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Capabilities requested once the server greeting has finished
pub const TWITCH_CAPABILITIES: &str = "twitch.tv/membership twitch.tv/tags twitch.tv/commands";

// IRC COMMUNICATION COMMANDS
pub const IRC_COMMAND_PONG: &str = "PONG";
pub const IRC_COMMAND_CHAT: &str = "PRIVMSG";
pub const IRC_COMMAND_JOIN: &str = "JOIN";

/// Leading character of a chat line that may be a command invocation
pub const COMMAND_MARKER: char = '!';

/// NOTICE texts Twitch sends when the supplied credentials are rejected
pub const AUTH_DENIED_NOTICES: [&str; 2] = [
    "Login authentication failed",
    "Improperly formatted auth",
];

pub const FADE_STEP_MILLIS: u64 = 50;
