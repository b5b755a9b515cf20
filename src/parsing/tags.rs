use std::path::PathBuf;

use tracing::warn;

use super::commands::IrcCommand;
use super::parser::{ParseError, ParseResult, ProtocolLine};

pub struct Tag;

impl Tag {
    pub const DISPLAY_NAME: &str = "display-name";
    pub const COLOR: &str = "color";
    pub const BADGES: &str = "badges";
    pub const EMOTES: &str = "emotes";
    pub const USER_ID: &str = "user-id";
    pub const MESSAGE_ID: &str = "id";
    pub const LOGIN: &str = "login";
    pub const MSG_ID: &str = "msg-id";
    pub const SYSTEM_MSG: &str = "system-msg";
    pub const TARGET_MSG_ID: &str = "target-msg-id";
}

const ACTION_PREFIX: &str = "\u{1}ACTION ";
const ACTION_SUFFIX: char = '\u{1}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Parses `#RRGGBB`; an empty value means "no override" and yields `None` quietly
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let parsed = raw
            .strip_prefix('#')
            .filter(|hex| hex.len() == 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| {
                Some(Self {
                    r: u8::from_str_radix(&hex[0..2], 16).ok()?,
                    g: u8::from_str_radix(&hex[2..4], 16).ok()?,
                    b: u8::from_str_radix(&hex[4..6], 16).ok()?,
                })
            });

        if parsed.is_none() {
            warn!(color = raw, "dropping malformed color tag");
        }

        parsed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Badge {
    pub name: String,
    pub version: String,
}

/// Decodes `name/version,name/version`; entries without a version are dropped
pub fn parse_badges(raw: &str) -> Vec<Badge> {
    raw.split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('/') {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => Some(Badge {
                name: name.to_string(),
                version: version.to_string(),
            }),
            _ => {
                warn!(entry, "dropping badge entry without a version");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEmote {
    pub id: String,
    pub name: String,
    pub start: usize,
    /// Inclusive
    pub end: usize,
    pub path: Option<PathBuf>,
}

/// Decodes `id:start-end,start-end/id:start-end` into one emote per range, sorted by `start`
///
/// Names stay empty until `resolve_emote_names` has the message text.
pub fn parse_emotes(raw: &str) -> Vec<ChatEmote> {
    let mut emotes = Vec::new();

    for entry in raw.split('/').filter(|entry| !entry.is_empty()) {
        let Some((id, ranges)) = entry.split_once(':') else {
            warn!(entry, "dropping emote entry without ranges");
            continue;
        };

        for range in ranges.split(',') {
            let parsed = range
                .split_once('-')
                .and_then(|(start, end)| Some((start.parse().ok()?, end.parse().ok()?)));

            match parsed {
                Some((start, end)) => emotes.push(ChatEmote {
                    id: id.to_string(),
                    name: String::new(),
                    start,
                    end,
                    path: None,
                }),
                None => warn!(emote_id = id, range, "dropping malformed emote range"),
            }
        }
    }

    emotes.sort_by_key(|emote| emote.start);
    emotes
}

/// Second pass over the emotes: slice each name out of `text` by code-point index
///
/// Ranges that fall outside the text (or run backwards) are dropped.
pub fn resolve_emote_names(emotes: Vec<ChatEmote>, text: &str) -> Vec<ChatEmote> {
    let chars: Vec<char> = text.chars().collect();

    emotes
        .into_iter()
        .filter_map(|mut emote| {
            if emote.start > emote.end || emote.end >= chars.len() {
                warn!(
                    emote_id = %emote.id,
                    start = emote.start,
                    end = emote.end,
                    text_len = chars.len(),
                    "dropping emote range outside message text"
                );
                return None;
            }

            emote.name = chars[emote.start..=emote.end].iter().collect();
            Some(emote)
        })
        .collect()
}

/// A decoded chat line
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub channel: String,
    pub login: String,
    pub user_id: Option<String>,
    pub message_id: Option<String>,
    pub sender: String,
    pub text: String,
    pub color: Option<Color>,
    pub badges: Vec<Badge>,
    pub badge_icon_paths: Vec<PathBuf>,
    pub emotes: Vec<ChatEmote>,
    pub action: bool,
    pub broadcaster: bool,
    pub moderator: bool,
}

impl ChatMessage {
    pub fn privileged(&self) -> bool {
        self.broadcaster || self.moderator
    }

    /// Decodes a PRIVMSG; the sender's identity comes from the hostmask, which is required
    pub fn from_privmsg(line: &ProtocolLine) -> ParseResult<Self> {
        let login = line.hostmask()?.nick;
        let text = line.trailing.clone().unwrap_or_default();

        Self::decode(line, login, text)
    }

    /// Decodes the chat part of a USERNOTICE, whose source is the server rather than the user
    pub fn from_usernotice(line: &ProtocolLine) -> ParseResult<Self> {
        let login = line
            .tag(Tag::LOGIN)
            .filter(|login| !login.is_empty())
            .ok_or_else(|| ParseError::MissingParameter {
                command: IrcCommand::UserNotice.to_string(),
                param: Tag::LOGIN.to_string(),
            })?
            .to_string();
        let text = line.trailing.clone().unwrap_or_default();

        Self::decode(line, login, text)
    }

    fn decode(line: &ProtocolLine, login: String, raw_text: String) -> ParseResult<Self> {
        let channel = line.require_param(0, "channel")?.to_string();

        let (text, action) = match raw_text
            .strip_prefix(ACTION_PREFIX)
            .and_then(|rest| rest.strip_suffix(ACTION_SUFFIX))
        {
            Some(inner) => (inner.to_string(), true),
            None => (raw_text, false),
        };

        let sender = line
            .tag(Tag::DISPLAY_NAME)
            .filter(|name| !name.is_empty())
            .unwrap_or(login.as_str())
            .to_string();

        let color = line.tag(Tag::COLOR).and_then(Color::parse);
        let badges = line.tag(Tag::BADGES).map(parse_badges).unwrap_or_default();
        let broadcaster = has_badge(&badges, "broadcaster");
        let moderator = has_badge(&badges, "moderator");

        let emotes = line.tag(Tag::EMOTES).map(parse_emotes).unwrap_or_default();
        let emotes = resolve_emote_names(emotes, &text);

        Ok(Self {
            channel,
            login,
            user_id: line.tag(Tag::USER_ID).map(str::to_string),
            message_id: line.tag(Tag::MESSAGE_ID).map(str::to_string),
            sender,
            text,
            color,
            badges,
            badge_icon_paths: Vec::new(),
            emotes,
            action,
            broadcaster,
            moderator,
        })
    }
}

fn has_badge(badges: &[Badge], name: &str) -> bool {
    badges
        .iter()
        .any(|badge| badge.name == name && badge.version == "1")
}
