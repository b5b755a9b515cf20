use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace};
use uuid::Uuid;

use crate::constants::IRC_COMMAND_CHAT;
use crate::parsing::frame::FrameReader;
use crate::socket::core::{ChannelError, ChannelEvent, ChannelResult, Credentials};
use crate::socket::machine::{ChannelStateMachine, Step};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type Writer = SplitSink<WsStream, Message>;
pub type Reader = SplitStream<WsStream>;

#[derive(Debug)]
pub enum ChannelCommand {
    Say(String),
}

/// Cloneable control surface for a running channel connection
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    cancel: CancellationToken,
}

impl ChannelHandle {
    /// Queues a chat message to the joined channel
    pub fn say(&self, text: &str) -> ChannelResult<()> {
        self.commands
            .send(ChannelCommand::Say(text.to_string()))
            .map_err(|_| ChannelError::ConnectionClosed)
    }

    pub fn disconnect(&self) {
        debug!(id = %self.id, "disconnect requested");
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }
}

/// A live connection: its handle, the events it produces, and the task driving it
#[derive(Debug)]
pub struct ChannelConnection {
    pub handle: ChannelHandle,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub task: JoinHandle<ChannelResult<()>>,
}

pub struct ChannelClient {
    id: Uuid,
    room: String,
    writer: Writer,
    reader: Reader,
    machine: ChannelStateMachine,
    frames: FrameReader,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelClient {
    /// Opens the websocket and spawns the read/write loop
    ///
    /// Authentication starts immediately; progress is reported through the returned event
    /// receiver, ending with `ChannelEvent::Disconnected`.
    pub async fn connect(url: &str, credentials: Credentials) -> ChannelResult<ChannelConnection> {
        let (stream, _) = connect_async(url).await?;
        let (writer, reader) = stream.split();

        let id = Uuid::new_v4();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(%id, url, channel = %credentials.room(), "websocket connected");

        let client = Self {
            id,
            room: credentials.room(),
            writer,
            reader,
            machine: ChannelStateMachine::new(credentials),
            frames: FrameReader::new(),
            events: event_tx,
        };

        let span = info_span!("channel", %id);
        let task = tokio::spawn(client.run(command_rx, cancel.clone()).instrument(span));

        Ok(ChannelConnection {
            handle: ChannelHandle {
                id,
                commands: command_tx,
                cancel,
            },
            events: event_rx,
            task,
        })
    }

    async fn run(
        mut self,
        commands: mpsc::UnboundedReceiver<ChannelCommand>,
        cancel: CancellationToken,
    ) -> ChannelResult<()> {
        let outcome = self.session(commands, cancel).await;
        if let Err(e) = &outcome {
            error!(id = %self.id, error = %e, "channel session ended with an error");
        }

        self.frames.finish();
        let step = self.machine.disconnect();
        self.forward(step.events);

        outcome
    }

    async fn session(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
        cancel: CancellationToken,
    ) -> ChannelResult<()> {
        let step = self.machine.on_connect();
        self.apply(step).await?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(channel = %self.room, "disconnect requested, sending PART");
                    let part = format!("PART {}", self.room);
                    if let Err(e) = self.write(&part).await {
                        debug!(error = %e, "failed to send PART");
                    }

                    let _ = self.writer.close().await;
                    return Ok(());
                }

                Some(command) = commands.recv() => {
                    let ChannelCommand::Say(text) = command;
                    let line = format!("{} {} :{}", IRC_COMMAND_CHAT, self.room, text);
                    self.write(&line).await?;
                }

                incoming = self.reader.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.receive(text.as_bytes()).await?,
                    Some(Ok(Message::Binary(bytes))) => self.receive(&bytes).await?,
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the connection");
                        return Ok(());
                    }
                    // control frames are answered by tungstenite
                    Some(Ok(_)) => (),
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("websocket stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn receive(&mut self, data: &[u8]) -> ChannelResult<()> {
        for line in self.frames.feed(data) {
            trace!(line = %line, "rx");
            let step = self.machine.handle_line(&line);
            self.apply(step).await?;
        }

        Ok(())
    }

    async fn apply(&mut self, step: Step) -> ChannelResult<()> {
        for reply in &step.replies {
            self.write(reply).await?;
        }

        self.forward(step.events);
        Ok(())
    }

    fn forward(&self, events: Vec<ChannelEvent>) {
        for event in events {
            if self.events.send(event).is_err() {
                debug!("event receiver dropped, discarding event");
            }
        }
    }

    async fn write(&mut self, line: &str) -> ChannelResult<()> {
        if line.starts_with("PASS ") {
            debug!("tx PASS oauth:<redacted>");
        } else {
            debug!(line, "tx");
        }

        self.writer.send(Message::text(line.to_string())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::future::IntoFuture;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::WebSocketUpgrade;
    use axum::extract::ws::{self, WebSocket};
    use axum::response::Response;
    use axum::routing::get;
    use tokio::net::TcpListener;

    use super::*;

    async fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        (listener, addr)
    }

    fn router() -> Router {
        Router::new()
            .route("/irc", get(scripted_handler))
            .route("/hangup", get(hangup_handler))
    }

    async fn scripted_handler(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(scripted_chat)
    }

    async fn hangup_handler(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(|socket: WebSocket| async move { drop(socket) })
    }

    /// Plays the server side of a channel session, one reply batch per client line
    async fn scripted_chat(mut socket: WebSocket) {
        while let Some(Ok(msg)) = socket.recv().await {
            let ws::Message::Text(line) = msg else {
                continue;
            };
            let line = line.as_str();

            let frames: Vec<String> = if line.starts_with("NICK") {
                vec![
                    ":tmi.twitch.tv 001 overlaybot :Welcome, GLHF!\r\n:tmi.twitch.tv 376 overlaybot :>\r\n"
                        .to_string(),
                ]
            } else if line.starts_with("CAP REQ") {
                vec![
                    ":tmi.twitch.tv CAP * ACK :twitch.tv/membership twitch.tv/tags twitch.tv/commands\r\n"
                        .to_string(),
                ]
            } else if line == "JOIN #chan" {
                vec![
                    ":overlaybot!overlaybot@overlaybot.tmi.twitch.tv JOIN #chan\r\n:overlaybot.tmi.twitch.tv 353 overlaybot = #chan :overlaybot viewer\r\n".to_string(),
                    // one chat line split across two frames
                    "@display-name=Viewer :viewer!viewer@viewer.tmi.twitch.tv PRIV".to_string(),
                    "MSG #chan :hello there\r\nPING :tmi.twitch.tv\r\n".to_string(),
                ]
            } else if line == "PONG :tmi.twitch.tv" {
                vec![
                    ":server!server@server.tmi.twitch.tv PRIVMSG #chan :pong received\r\n"
                        .to_string(),
                ]
            } else if let Some(text) = line.strip_prefix("PRIVMSG #chan :") {
                vec![format!(
                    ":server!server@server.tmi.twitch.tv PRIVMSG #chan :echo {}\r\n",
                    text
                )]
            } else if line == "PART #chan" {
                break;
            } else {
                Vec::new()
            };

            for frame in frames {
                if socket.send(ws::Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn serve() -> SocketAddr {
        let (listener, addr) = listener().await;
        tokio::spawn(axum::serve(listener, router()).into_future());

        addr
    }

    /// Collects events until `done` matches one, failing the test after a few seconds
    async fn collect_until<F>(
        events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
        done: F,
    ) -> Vec<ChannelEvent>
    where
        F: Fn(&ChannelEvent) -> bool,
    {
        let mut seen = Vec::new();

        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                let finished = done(&event);
                seen.push(event);
                if finished {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for channel events");

        seen
    }

    fn is_chat(event: &ChannelEvent, text: &str) -> bool {
        matches!(event, ChannelEvent::Chat(chat) if chat.text == text)
    }

    #[tokio::test]
    async fn test_session_against_scripted_server() {
        let addr = serve().await;
        let url = format!("ws://{}/irc", addr);

        let mut conn = ChannelClient::connect(&url, Credentials::new("token", "overlaybot", "chan"))
            .await
            .unwrap();

        let events = collect_until(&mut conn.events, |e| is_chat(e, "pong received")).await;

        assert_eq!(events[0], ChannelEvent::Connected);
        assert!(events.contains(&ChannelEvent::Joined {
            channel: "chan".to_string()
        }));
        assert!(events.contains(&ChannelEvent::ViewerPresent {
            login: "viewer".to_string()
        }));

        let hello = events
            .iter()
            .find_map(|event| match event {
                ChannelEvent::Chat(chat) if chat.text == "hello there" => Some(chat),
                _ => None,
            })
            .expect("split chat line was not reassembled");
        assert_eq!(hello.sender, "Viewer");

        conn.handle.say("hi chat").unwrap();
        collect_until(&mut conn.events, |e| is_chat(e, "echo hi chat")).await;

        conn.handle.disconnect();
        let events = collect_until(&mut conn.events, |e| *e == ChannelEvent::Disconnected).await;
        assert_eq!(events.last(), Some(&ChannelEvent::Disconnected));

        conn.task.await.unwrap().unwrap();
        assert!(conn.handle.is_closed());
        assert!(conn.handle.say("too late").is_err());
    }

    #[tokio::test]
    async fn test_server_hangup_reports_disconnect() {
        let addr = serve().await;
        let url = format!("ws://{}/hangup", addr);

        let mut conn = ChannelClient::connect(&url, Credentials::new("token", "overlaybot", "chan"))
            .await
            .unwrap();

        let events = collect_until(&mut conn.events, |e| *e == ChannelEvent::Disconnected).await;
        assert_eq!(events.last(), Some(&ChannelEvent::Disconnected));

        // a hangup may surface as a clean close or a write error, but the task always ends
        let _ = conn.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_an_error() {
        let (listener, addr) = listener().await;
        drop(listener);

        let result =
            ChannelClient::connect(&format!("ws://{}/irc", addr), Credentials::new("t", "b", "c"))
                .await;
        assert!(matches!(result, Err(ChannelError::Websocket(_))));
    }
}
