use std::collections::HashMap;

use thiserror::Error;
use tracing::{trace, warn};

use super::commands::IrcCommand;
use crate::parsing::lexer::Lexer;

pub type ParseResult<T> = core::result::Result<T, ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("cannot find a command in message - raw: {0}")]
    MissingCommand(String),

    #[error("missing or malformed hostmask: {0:?}")]
    InvalidHostmask(Option<String>),

    #[error("cannot find required parameter for command '{command}': {param}")]
    MissingParameter { command: String, param: String },
}

/// One decoded protocol line
///
/// `params` holds only the middle parameters; the `:`-prefixed final parameter is kept apart in
/// `trailing` because it may contain spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: IrcCommand,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl ProtocolLine {
    /// The line's source as a `nick!user@host` hostmask
    pub fn hostmask(&self) -> ParseResult<Hostmask> {
        self.prefix
            .as_deref()
            .and_then(Hostmask::parse)
            .ok_or_else(|| ParseError::InvalidHostmask(self.prefix.clone()))
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Fetches middle parameter `idx`, failing with the parameter's name for diagnostics
    pub fn require_param(&self, idx: usize, name: &str) -> ParseResult<&str> {
        self.param(idx).ok_or_else(|| ParseError::MissingParameter {
            command: self.command.to_string(),
            param: name.to_string(),
        })
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Represents the source of a message in `nick!user@host` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostmask {
    pub nick: String,
    pub user: String,
    pub host: String,
}

impl Hostmask {
    /// Returns `None` unless both the `!` and `@` separators are present
    pub fn parse(prefix: &str) -> Option<Self> {
        let (nick, user_host) = prefix.split_once('!')?;
        let (user, host) = user_host.split_once('@')?;

        Some(Self {
            nick: nick.to_string(),
            user: user.to_string(),
            host: host.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct IrcParser;

impl IrcParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> ParseResult<ProtocolLine> {
        let input = raw.trim_end_matches('\n').trim_end_matches('\r');
        let mut lexer = Lexer::new(input);

        let mut tags = HashMap::new();
        if lexer.eat('@') {
            if let Some(section) = lexer.next_word() {
                tags = parse_tags(section);
            }

            lexer.skip_spaces();
        }

        let mut prefix = None;
        if lexer.eat(':') {
            prefix = lexer.next_word().map(str::to_string);
            lexer.skip_spaces();
        }

        let command = lexer
            .next_word()
            .map(IrcCommand::from)
            .ok_or_else(|| ParseError::MissingCommand(input.to_string()))?;
        lexer.skip_spaces();

        let (params, trailing) = parse_params(&mut lexer);

        trace!(
            %command,
            tags = tags.len(),
            params = params.len(),
            has_trailing = trailing.is_some(),
            "parsed protocol line"
        );

        Ok(ProtocolLine {
            tags,
            prefix,
            command,
            params,
            trailing,
        })
    }
}

/// Splits a tags section (without its leading `@`) into key/value pairs
///
/// A pair that has no `=` or an empty key is dropped; the rest of the section is still used.
pub fn parse_tags(section: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();

    for pair in section.split(';').filter(|pair| !pair.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                tags.insert(key.to_string(), unescape_tag_value(value));
            }
            _ => warn!(pair, "dropping malformed tag pair"),
        }
    }

    tags
}

/// Decodes IRCv3 tag value escapes
pub fn unescape_tag_value(value: &str) -> String {
    if !value.contains('\\') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }

        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => (),
        }
    }

    out
}

fn parse_params(lexer: &mut Lexer) -> (Vec<String>, Option<String>) {
    let mut params = Vec::new();

    while !lexer.is_eof() {
        if lexer.eat(':') {
            let trailing = lexer.rest().unwrap_or_default().to_string();
            return (params, Some(trailing));
        }

        match lexer.next_word() {
            Some(param) => params.push(param.to_string()),
            None => break,
        }

        lexer.skip_spaces();
    }

    (params, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg() {
        let input = "@badge-info=;badges=broadcaster/1;color=#FFBEDF;display-name=plss;user-id=103033809 :plss!plss@plss.tmi.twitch.tv PRIVMSG #plss :Hello world :)";

        let line = IrcParser::new().parse(input).unwrap();

        assert_eq!(line.command, IrcCommand::PrivMsg);
        assert_eq!(line.params, vec!["#plss"]);
        assert_eq!(line.trailing.as_deref(), Some("Hello world :)"));
        assert_eq!(line.tag("display-name"), Some("plss"));
        assert_eq!(line.tag("badge-info"), Some(""));
        assert_eq!(line.tag("user-id"), Some("103033809"));

        let hostmask = line.hostmask().unwrap();
        assert_eq!(hostmask.nick, "plss");
        assert_eq!(hostmask.user, "plss");
        assert_eq!(hostmask.host, "plss.tmi.twitch.tv");
    }

    #[test]
    fn test_parse_numeric_without_tags() {
        let input = ":tmi.twitch.tv 376 bot :>\r\n";
        let line = IrcParser::new().parse(input).unwrap();

        assert!(line.tags.is_empty());
        assert_eq!(line.prefix.as_deref(), Some("tmi.twitch.tv"));
        assert_eq!(line.command, IrcCommand::EndOfMotd);
        assert_eq!(line.params, vec!["bot"]);
        assert_eq!(line.trailing.as_deref(), Some(">"));
    }

    #[test]
    fn test_parse_ping_without_prefix() {
        let line = IrcParser::new().parse("PING :tmi.twitch.tv").unwrap();

        assert_eq!(line.prefix, None);
        assert_eq!(line.command, IrcCommand::Ping);
        assert!(line.params.is_empty());
        assert_eq!(line.trailing.as_deref(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_parse_unknown_command() {
        let line = IrcParser::new()
            .parse(":server UNKNOWNCMD param1 param2")
            .unwrap();

        assert_eq!(
            line.command,
            IrcCommand::Unrecognized("UNKNOWNCMD".to_string())
        );
        assert_eq!(line.params, vec!["param1", "param2"]);
        assert_eq!(line.trailing, None);
    }

    #[test]
    fn test_missing_command_aborts_line() {
        let err = IrcParser::new().parse("@a=b :nick!u@h").unwrap_err();
        assert!(matches!(err, ParseError::MissingCommand(_)));

        assert!(IrcParser::new().parse("").is_err());
    }

    #[test]
    fn test_malformed_tag_pairs_are_dropped() {
        let tags = parse_tags("good=1;novalue;=empty-key;also=fine=with=equals;;");

        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("good").map(String::as_str), Some("1"));
        assert_eq!(
            tags.get("also").map(String::as_str),
            Some("fine=with=equals")
        );
    }

    #[test]
    fn test_tag_value_unescape() {
        assert_eq!(
            unescape_tag_value(r"Bob\shas\ssubscribed\:\s5\\months"),
            r"Bob has subscribed; 5\months"
        );
        assert_eq!(unescape_tag_value("plain"), "plain");
        assert_eq!(unescape_tag_value(r"trailing\"), "trailing");
    }

    #[test]
    fn test_hostmask_requires_both_separators() {
        assert!(Hostmask::parse("tmi.twitch.tv").is_none());
        assert!(Hostmask::parse("nick!user").is_none());
        assert!(Hostmask::parse("nick@host").is_none());
        assert!(Hostmask::parse("nick!user@host").is_some());

        let line = IrcParser::new()
            .parse(":tmi.twitch.tv PRIVMSG #c :x")
            .unwrap();
        assert_eq!(
            line.hostmask(),
            Err(ParseError::InvalidHostmask(Some("tmi.twitch.tv".to_string())))
        );
    }

    #[test]
    fn test_require_param_reports_name() {
        let line = IrcParser::new().parse("JOIN").unwrap();
        let err = line.require_param(0, "channel").unwrap_err();

        assert_eq!(
            err,
            ParseError::MissingParameter {
                command: "JOIN".to_string(),
                param: "channel".to_string()
            }
        );
    }
}
