use core::fmt;

/// Protocol command codes the channel reacts to
///
/// Numeric replies and named commands share this table. Anything else lands in `Numeric` or
/// `Unrecognized` so callers can log it without treating it as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcCommand {
    /// `001`
    Welcome,
    /// `353`
    NamReply,
    /// `366`
    EndOfNames,
    /// `376`
    EndOfMotd,
    Cap,
    Join,
    Part,
    PrivMsg,
    Notice,
    UserNotice,
    ClearMsg,
    ClearChat,
    Ping,
    Pong,
    Reconnect,
    /// A numeric reply with no dedicated variant
    Numeric(u16),
    Unrecognized(String),
}

impl IrcCommand {
    pub const RPL_WELCOME: u16 = 1;
    pub const RPL_NAMREPLY: u16 = 353;
    pub const RPL_ENDOFNAMES: u16 = 366;
    pub const RPL_ENDOFMOTD: u16 = 376;

    fn from_numeric(code: u16) -> Self {
        match code {
            Self::RPL_WELCOME => Self::Welcome,
            Self::RPL_NAMREPLY => Self::NamReply,
            Self::RPL_ENDOFNAMES => Self::EndOfNames,
            Self::RPL_ENDOFMOTD => Self::EndOfMotd,
            other => Self::Numeric(other),
        }
    }
}

impl From<&str> for IrcCommand {
    fn from(token: &str) -> Self {
        if token.len() == 3 && token.bytes().all(|b| b.is_ascii_digit()) {
            // three ascii digits always fit
            if let Ok(code) = token.parse::<u16>() {
                return Self::from_numeric(code);
            }
        }

        match token.to_ascii_uppercase().as_str() {
            "CAP" => Self::Cap,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "PRIVMSG" => Self::PrivMsg,
            "NOTICE" => Self::Notice,
            "USERNOTICE" => Self::UserNotice,
            "CLEARMSG" => Self::ClearMsg,
            "CLEARCHAT" => Self::ClearChat,
            "PING" => Self::Ping,
            "PONG" => Self::Pong,
            "RECONNECT" => Self::Reconnect,
            _ => Self::Unrecognized(token.to_string()),
        }
    }
}

impl fmt::Display for IrcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let named = match self {
            Self::Welcome => return write!(f, "{:03}", Self::RPL_WELCOME),
            Self::NamReply => return write!(f, "{}", Self::RPL_NAMREPLY),
            Self::EndOfNames => return write!(f, "{}", Self::RPL_ENDOFNAMES),
            Self::EndOfMotd => return write!(f, "{}", Self::RPL_ENDOFMOTD),
            Self::Numeric(code) => return write!(f, "{:03}", code),
            Self::Unrecognized(raw) => raw.as_str(),
            Self::Cap => "CAP",
            Self::Join => "JOIN",
            Self::Part => "PART",
            Self::PrivMsg => "PRIVMSG",
            Self::Notice => "NOTICE",
            Self::UserNotice => "USERNOTICE",
            Self::ClearMsg => "CLEARMSG",
            Self::ClearChat => "CLEARCHAT",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Reconnect => "RECONNECT",
        };

        f.write_str(named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_classification() {
        assert_eq!(IrcCommand::from("376"), IrcCommand::EndOfMotd);
        assert_eq!(IrcCommand::from("353"), IrcCommand::NamReply);
        assert_eq!(IrcCommand::from("001"), IrcCommand::Welcome);
        assert_eq!(IrcCommand::from("372"), IrcCommand::Numeric(372));
        assert_eq!(IrcCommand::Numeric(2).to_string(), "002");
    }

    #[test]
    fn test_named_classification() {
        assert_eq!(IrcCommand::from("PRIVMSG"), IrcCommand::PrivMsg);
        assert_eq!(IrcCommand::from("privmsg"), IrcCommand::PrivMsg);
        assert_eq!(
            IrcCommand::from("HOSTTARGET"),
            IrcCommand::Unrecognized("HOSTTARGET".to_string())
        );
        // not three digits, so not a numeric reply
        assert_eq!(
            IrcCommand::from("4000"),
            IrcCommand::Unrecognized("4000".to_string())
        );
    }
}
