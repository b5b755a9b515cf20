use tracing::{debug, info, trace, warn};

use crate::constants::{
    AUTH_DENIED_NOTICES, IRC_COMMAND_JOIN, IRC_COMMAND_PONG, TWITCH_CAPABILITIES,
};
use crate::parsing::commands::IrcCommand;
use crate::parsing::parser::{IrcParser, ProtocolLine};
use crate::parsing::tags::{ChatMessage, Tag};
use crate::socket::core::{ChannelEvent, Credentials, Phase};

/// Lines to write back to the server and events to hand to the caller, produced by one input
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub replies: Vec<String>,
    pub events: Vec<ChannelEvent>,
}

impl Step {
    fn reply(mut self, line: String) -> Self {
        self.replies.push(line);
        self
    }

    fn event(mut self, event: ChannelEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Drives a single channel connection from credentials to steady-state dispatch
///
/// The machine does no I/O; the transport feeds it lines and writes out whatever it replies.
#[derive(Debug)]
pub struct ChannelStateMachine {
    phase: Phase,
    credentials: Credentials,
    parser: IrcParser,
}

impl ChannelStateMachine {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            phase: Phase::Connecting,
            credentials,
            parser: IrcParser::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Transport is up: authenticate
    pub fn on_connect(&mut self) -> Step {
        self.phase = Phase::Authenticating;

        Step::default()
            .reply(self.credentials.pass())
            .reply(self.credentials.nick())
            .event(ChannelEvent::Connected)
    }

    pub fn disconnect(&mut self) -> Step {
        if self.phase == Phase::Disconnected {
            return Step::default();
        }

        info!(channel = %self.credentials.room(), "channel disconnected");
        self.phase = Phase::Disconnected;
        Step::default().event(ChannelEvent::Disconnected)
    }

    /// Processes one received line
    ///
    /// A line that cannot be parsed, or that lacks a source it needs, is dropped on its own; it
    /// never changes the phase.
    pub fn handle_line(&mut self, raw: &str) -> Step {
        if self.phase == Phase::Disconnected {
            debug!(raw, "ignoring line received after disconnect");
            return Step::default();
        }

        let line = match self.parser.parse(raw) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "dropping unparseable line");
                return Step::default();
            }
        };

        trace!(command = %line.command, phase = ?self.phase, "routing line");

        match &line.command {
            IrcCommand::EndOfMotd => self.on_end_of_motd(),
            IrcCommand::Cap => self.on_cap(&line),
            IrcCommand::NamReply => self.on_names(&line),
            IrcCommand::EndOfNames => self.on_end_of_names(),
            IrcCommand::Join => self.on_join(&line),
            IrcCommand::Part => self.on_part(&line),
            IrcCommand::Ping => self.on_ping(&line),
            IrcCommand::PrivMsg => self.on_privmsg(&line),
            IrcCommand::Notice => self.on_notice(&line),
            IrcCommand::UserNotice => self.on_usernotice(&line),
            IrcCommand::ClearMsg => self.on_clearmsg(&line),
            IrcCommand::ClearChat => Step::default().event(ChannelEvent::ChatCleared {
                target: line.trailing.clone().filter(|target| !target.is_empty()),
            }),
            IrcCommand::Reconnect => {
                warn!("server requested a reconnect");
                Step::default().event(ChannelEvent::ReconnectRequested)
            }
            IrcCommand::Welcome | IrcCommand::Pong => {
                trace!(command = %line.command, "acknowledged");
                Step::default()
            }
            IrcCommand::Numeric(_) | IrcCommand::Unrecognized(_) => {
                debug!(
                    command = %line.command,
                    params = ?line.params,
                    "ignoring unrecognized command"
                );
                Step::default()
            }
        }
    }

    fn on_end_of_motd(&mut self) -> Step {
        if self.phase != Phase::Authenticating {
            debug!(phase = ?self.phase, "ignoring repeated end of greeting");
            return Step::default();
        }

        self.phase = Phase::AwaitingCapabilities;
        Step::default().reply(format!("CAP REQ :{}", TWITCH_CAPABILITIES))
    }

    fn on_cap(&mut self, line: &ProtocolLine) -> Step {
        let caps = line.trailing.as_deref().unwrap_or_default();

        match line.param(1) {
            Some("ACK") => info!(caps, "capabilities acknowledged"),
            Some("NAK") => warn!(caps, "capabilities rejected, continuing without them"),
            other => {
                debug!(subcommand = ?other, caps, "ignoring CAP subcommand");
                return Step::default();
            }
        }

        if self.phase != Phase::AwaitingCapabilities {
            return Step::default();
        }

        self.phase = Phase::Joining;
        Step::default().reply(format!("{} {}", IRC_COMMAND_JOIN, self.credentials.room()))
    }

    /// Twitch may mix newlines into the space-separated name list
    fn on_names(&mut self, line: &ProtocolLine) -> Step {
        let names = line.trailing.as_deref().unwrap_or_default();

        names
            .split_whitespace()
            .fold(Step::default(), |step, login| {
                step.event(ChannelEvent::ViewerPresent {
                    login: login.to_string(),
                })
            })
    }

    fn on_end_of_names(&mut self) -> Step {
        if self.phase == Phase::Joining {
            return self.joined();
        }

        Step::default()
    }

    fn on_join(&mut self, line: &ProtocolLine) -> Step {
        let hostmask = match line.hostmask() {
            Ok(hostmask) => hostmask,
            Err(e) => {
                warn!(error = %e, "dropping JOIN without a usable source");
                return Step::default();
            }
        };

        if hostmask.nick.eq_ignore_ascii_case(&self.credentials.login) {
            if self.phase == Phase::Joining {
                return self.joined();
            }

            return Step::default();
        }

        Step::default().event(ChannelEvent::ViewerJoined {
            login: hostmask.nick,
        })
    }

    fn on_part(&mut self, line: &ProtocolLine) -> Step {
        match line.hostmask() {
            Ok(hostmask) if !hostmask.nick.eq_ignore_ascii_case(&self.credentials.login) => {
                Step::default().event(ChannelEvent::ViewerParted {
                    login: hostmask.nick,
                })
            }
            Ok(_) => Step::default(),
            Err(e) => {
                warn!(error = %e, "dropping PART without a usable source");
                Step::default()
            }
        }
    }

    fn joined(&mut self) -> Step {
        self.phase = Phase::SteadyState;
        info!(channel = %self.credentials.room(), "joined channel");

        Step::default().event(ChannelEvent::Joined {
            channel: self.credentials.channel.clone(),
        })
    }

    fn on_ping(&mut self, line: &ProtocolLine) -> Step {
        let token = line
            .trailing
            .as_deref()
            .or_else(|| line.param(0))
            .unwrap_or_default();

        trace!(token, "rx KEEPALIVE");
        Step::default().reply(format!("{} :{}", IRC_COMMAND_PONG, token))
    }

    fn on_privmsg(&mut self, line: &ProtocolLine) -> Step {
        match ChatMessage::from_privmsg(line) {
            Ok(chat) => Step::default().event(ChannelEvent::Chat(chat)),
            Err(e) => {
                warn!(error = %e, "dropping chat line");
                Step::default()
            }
        }
    }

    fn on_notice(&mut self, line: &ProtocolLine) -> Step {
        let notice = line.trailing.clone().unwrap_or_default();

        if AUTH_DENIED_NOTICES
            .iter()
            .any(|denied| notice.contains(denied))
        {
            warn!(%notice, "authentication denied");
            return Step::default().event(ChannelEvent::AuthenticationDenied { notice });
        }

        info!(%notice, msg_id = ?line.tag(Tag::MSG_ID), "NOTICE");
        Step::default()
    }

    fn on_usernotice(&mut self, line: &ProtocolLine) -> Step {
        let chat = match ChatMessage::from_usernotice(line) {
            Ok(chat) => Some(chat),
            Err(e) => {
                debug!(error = %e, "USERNOTICE without chat details");
                None
            }
        };

        Step::default().event(ChannelEvent::UserNotice {
            kind: line.tag(Tag::MSG_ID).map(str::to_string),
            system_message: line.tag(Tag::SYSTEM_MSG).map(str::to_string),
            chat,
        })
    }

    fn on_clearmsg(&mut self, line: &ProtocolLine) -> Step {
        match line.tag(Tag::TARGET_MSG_ID) {
            Some(target) => Step::default().event(ChannelEvent::MessageDeleted {
                target_message_id: target.to_string(),
                login: line.tag(Tag::LOGIN).map(str::to_string),
            }),
            None => {
                warn!("dropping CLEARMSG without a target message id");
                Step::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> ChannelStateMachine {
        ChannelStateMachine::new(Credentials::new("token", "overlaybot", "chan"))
    }

    /// Walks a fresh machine through the whole handshake
    fn joined_machine() -> ChannelStateMachine {
        let mut machine = machine();
        machine.on_connect();
        machine.handle_line(":tmi.twitch.tv 376 overlaybot :>");
        machine.handle_line(
            ":tmi.twitch.tv CAP * ACK :twitch.tv/membership twitch.tv/tags twitch.tv/commands",
        );
        machine.handle_line(":overlaybot!overlaybot@overlaybot.tmi.twitch.tv JOIN #chan");
        assert_eq!(machine.phase(), Phase::SteadyState);

        machine
    }

    #[test]
    fn test_handshake_sequence() {
        let mut machine = machine();
        assert_eq!(machine.phase(), Phase::Connecting);

        let step = machine.on_connect();
        assert_eq!(step.replies, vec!["PASS oauth:token", "NICK overlaybot"]);
        assert_eq!(step.events, vec![ChannelEvent::Connected]);
        assert_eq!(machine.phase(), Phase::Authenticating);

        let step = machine.handle_line(":tmi.twitch.tv 001 overlaybot :Welcome, GLHF!");
        assert_eq!(step, Step::default());
        assert_eq!(machine.phase(), Phase::Authenticating);

        let step = machine.handle_line(":tmi.twitch.tv 376 overlaybot :>");
        assert_eq!(
            step.replies,
            vec!["CAP REQ :twitch.tv/membership twitch.tv/tags twitch.tv/commands"]
        );
        assert_eq!(machine.phase(), Phase::AwaitingCapabilities);

        let step = machine.handle_line(
            ":tmi.twitch.tv CAP * ACK :twitch.tv/membership twitch.tv/tags twitch.tv/commands",
        );
        assert_eq!(step.replies, vec!["JOIN #chan"]);
        assert_eq!(machine.phase(), Phase::Joining);

        let step = machine.handle_line(
            ":overlaybot!overlaybot@overlaybot.tmi.twitch.tv JOIN #chan",
        );
        assert_eq!(
            step.events,
            vec![ChannelEvent::Joined {
                channel: "chan".to_string()
            }]
        );
        assert_eq!(machine.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_cap_nak_still_joins() {
        let mut machine = machine();
        machine.on_connect();
        machine.handle_line(":tmi.twitch.tv 376 overlaybot :>");

        let step = machine.handle_line(":tmi.twitch.tv CAP * NAK :twitch.tv/membership");
        assert_eq!(step.replies, vec!["JOIN #chan"]);
        assert_eq!(machine.phase(), Phase::Joining);
    }

    #[test]
    fn test_end_of_names_confirms_join() {
        let mut machine = machine();
        machine.on_connect();
        machine.handle_line(":tmi.twitch.tv 376 overlaybot :>");
        machine.handle_line(":tmi.twitch.tv CAP * ACK :twitch.tv/tags");

        let step = machine.handle_line(
            ":overlaybot.tmi.twitch.tv 366 overlaybot #chan :End of /NAMES list",
        );
        assert_eq!(step.events.len(), 1);
        assert_eq!(machine.phase(), Phase::SteadyState);

        // a late own JOIN does not emit a second joined event
        let step = machine.handle_line(
            ":overlaybot!overlaybot@overlaybot.tmi.twitch.tv JOIN #chan",
        );
        assert!(step.events.is_empty());
    }

    #[test]
    fn test_name_list_with_mixed_separators() {
        let mut machine = joined_machine();
        let step = machine.handle_line(
            ":overlaybot.tmi.twitch.tv 353 overlaybot = #chan :alice bob\ncarol  dave",
        );

        let logins: Vec<String> = step
            .events
            .into_iter()
            .map(|event| match event {
                ChannelEvent::ViewerPresent { login } => login,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(logins, vec!["alice", "bob", "carol", "dave"]);
    }

    #[test]
    fn test_ping_pong() {
        let mut machine = joined_machine();
        let step = machine.handle_line("PING :tmi.twitch.tv");

        assert_eq!(step.replies, vec!["PONG :tmi.twitch.tv"]);
        assert!(step.events.is_empty());
        assert_eq!(machine.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_auth_denied_notice() {
        let mut machine = machine();
        machine.on_connect();

        let step = machine.handle_line(":tmi.twitch.tv NOTICE * :Login authentication failed");
        assert_eq!(
            step.events,
            vec![ChannelEvent::AuthenticationDenied {
                notice: "Login authentication failed".to_string()
            }]
        );

        let step = machine.handle_line(":tmi.twitch.tv NOTICE #chan :Some other notice");
        assert!(step.events.is_empty());
    }

    #[test]
    fn test_unknown_and_malformed_lines_are_not_fatal() {
        let mut machine = joined_machine();

        assert_eq!(machine.handle_line(":tmi.twitch.tv HOSTTARGET #chan :-"), Step::default());
        assert_eq!(
            machine.handle_line(":tmi.twitch.tv 421 overlaybot WHO :Unknown command"),
            Step::default()
        );
        assert_eq!(machine.handle_line("@only=tags"), Step::default());
        assert_eq!(
            machine.handle_line(":tmi.twitch.tv PRIVMSG #chan :no hostmask"),
            Step::default()
        );
        assert_eq!(machine.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_steady_state_routing() {
        let mut machine = joined_machine();

        let step = machine.handle_line(
            "@badges=broadcaster/1;display-name=Chan :chan!chan@chan.tmi.twitch.tv PRIVMSG #chan :!so someone",
        );
        match &step.events[..] {
            [ChannelEvent::Chat(chat)] => {
                assert_eq!(chat.text, "!so someone");
                assert!(chat.broadcaster);
            }
            other => panic!("unexpected events {:?}", other),
        }

        let step = machine.handle_line(":viewer!viewer@viewer.tmi.twitch.tv JOIN #chan");
        assert_eq!(step.events, vec![ChannelEvent::ViewerJoined { login: "viewer".to_string() }]);

        let step = machine.handle_line(":viewer!viewer@viewer.tmi.twitch.tv PART #chan");
        assert_eq!(step.events, vec![ChannelEvent::ViewerParted { login: "viewer".to_string() }]);

        let step = machine.handle_line(
            "@login=viewer;target-msg-id=abc-123 :tmi.twitch.tv CLEARMSG #chan :bad words",
        );
        assert_eq!(
            step.events,
            vec![ChannelEvent::MessageDeleted {
                target_message_id: "abc-123".to_string(),
                login: Some("viewer".to_string())
            }]
        );

        let step = machine.handle_line(":tmi.twitch.tv CLEARCHAT #chan");
        assert_eq!(step.events, vec![ChannelEvent::ChatCleared { target: None }]);

        let step = machine.handle_line(
            "@msg-id=raid;system-msg=5\\sraiders :tmi.twitch.tv USERNOTICE #chan",
        );
        match &step.events[..] {
            [ChannelEvent::UserNotice { kind, system_message, chat }] => {
                assert_eq!(kind.as_deref(), Some("raid"));
                assert_eq!(system_message.as_deref(), Some("5 raiders"));
                assert!(chat.is_none());
            }
            other => panic!("unexpected events {:?}", other),
        }
        assert_eq!(machine.phase(), Phase::SteadyState);
    }

    #[test]
    fn test_disconnect_is_terminal() {
        let mut machine = joined_machine();

        assert_eq!(machine.disconnect().events, vec![ChannelEvent::Disconnected]);
        assert_eq!(machine.phase(), Phase::Disconnected);
        assert!(machine.disconnect().events.is_empty());
        assert_eq!(machine.handle_line("PING :tmi.twitch.tv"), Step::default());
    }
}
