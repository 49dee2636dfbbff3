//! Plain-TCP IRC client implementing [`ChatTransport`].
//!
//! Only what the bridge needs: registration, JOIN, PRIVMSG/NOTICE and
//! keepalive. Inbound lines are read with a deadline so a drain never blocks
//! the scheduler for longer than `irc.drain_wait_ms`.

use super::{ChatTransport, InboundEvent};
use crate::config::IrcConfig;
use crate::error::TransportError;
use crate::format::truncate_line;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace};

/// Maximum IRC line length including the trailing CRLF
pub const MAX_LINE_BYTES: usize = 512;

/// Longest inbound line accepted, message tags included
pub const MAX_INBOUND_LINE_BYTES: usize = 8192;

/// How long the server gets to accept NICK/USER
const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Numerics that mean the server will not accept our registration
const REFUSED_REGISTRATION: &[&str] = &["432", "433", "436", "437", "465"];

/// One parsed protocol line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Source prefix without the leading `:`
    pub prefix: Option<String>,
    /// Command word or three-digit numeric
    pub command: String,
    /// Parameters; the trailing parameter is the last element
    pub params: Vec<String>,
}

/// Parse one IRC line. Returns `None` for blank lines.
///
/// Message tags (`@k=v ...`) are skipped.
pub fn parse_line(line: &str) -> Option<Message> {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    if rest.starts_with('@') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    rest = rest.trim_start_matches(' ');

    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
        prefix = Some(p.to_string());
        rest = r;
    }

    let mut words = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            if !words.is_empty() {
                words.push(trailing.to_string());
                break;
            }
        }
        let (word, r) = rest.split_once(' ').unwrap_or((rest, ""));
        words.push(word.to_string());
        rest = r;
    }

    if words.is_empty() {
        return None;
    }
    let command = words.remove(0).to_ascii_uppercase();
    Some(Message {
        prefix,
        command,
        params: words,
    })
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Bytes of a line that has not been completed yet
    partial: Vec<u8>,
}

impl Connection {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let line = line.replace(['\r', '\n'], " ");
        let line = truncate_line(&line, MAX_LINE_BYTES - 2);
        trace!(line = %line, "IRC >>");

        let mut wire = Vec::with_capacity(line.len() + 2);
        wire.extend_from_slice(line.as_bytes());
        wire.extend_from_slice(b"\r\n");
        self.writer
            .write_all(&wire)
            .await
            .map_err(|e| TransportError::lost(&e))
    }

    /// Next complete line, or `None` once `deadline` passes.
    ///
    /// `read_until` keeps already-read bytes in `partial` when the timeout
    /// fires, so nothing is lost between calls. A line longer than
    /// [`MAX_INBOUND_LINE_BYTES`] drops the connection.
    async fn read_line(&mut self, deadline: Instant) -> Result<Option<String>, TransportError> {
        let remaining = MAX_INBOUND_LINE_BYTES.saturating_sub(self.partial.len()) as u64;
        let mut bounded = (&mut self.reader).take(remaining);
        match timeout_at(deadline, bounded.read_until(b'\n', &mut self.partial)).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(TransportError::lost(&e)),
            Ok(Ok(_)) if self.partial.len() >= MAX_INBOUND_LINE_BYTES
                && self.partial.last() != Some(&b'\n') =>
            {
                Err(TransportError::ConnectionLost(format!(
                    "inbound line exceeds {MAX_INBOUND_LINE_BYTES} bytes"
                )))
            }
            Ok(Ok(0)) => Err(TransportError::ConnectionLost(
                "connection closed by server".to_string(),
            )),
            Ok(Ok(_)) => {
                if self.partial.last() != Some(&b'\n') {
                    return Err(TransportError::ConnectionLost(
                        "connection closed mid-line".to_string(),
                    ));
                }
                let line = String::from_utf8_lossy(&self.partial)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                self.partial.clear();
                trace!(line = %line, "IRC <<");
                Ok(Some(line))
            }
        }
    }

    async fn pong(&mut self, ping: &Message) -> Result<(), TransportError> {
        let token = ping.params.last().map(String::as_str).unwrap_or("");
        self.write_line(&format!("PONG :{token}")).await
    }
}

/// IRC connection over TCP
pub struct IrcConnection {
    conn: Option<Connection>,
    nick: String,
    drain_wait: Duration,
}

impl IrcConnection {
    /// Disconnected client whose drains wait up to `drain_wait` for input
    pub fn new(drain_wait: Duration) -> Self {
        Self {
            conn: None,
            nick: String::new(),
            drain_wait,
        }
    }

    /// Client configured from the `[irc]` table
    pub fn from_config(config: &IrcConfig) -> Self {
        Self::new(Duration::from_millis(config.drain_wait_ms))
    }

    /// Whether a registered connection is open
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = conn.write_line(line).await {
            self.conn = None;
            return Err(e);
        }
        Ok(())
    }

    async fn send_to(&mut self, command: &str, target: &str, text: &str) -> Result<(), TransportError> {
        if target.is_empty() || target.contains([' ', ',', '\r', '\n']) {
            return Err(TransportError::SendFailed {
                target: target.to_string(),
                reason: "invalid target".to_string(),
            });
        }
        self.send_line(&format!("{command} {target} :{text}")).await
    }
}

#[async_trait]
impl ChatTransport for IrcConnection {
    async fn connect(&mut self, server: &str, port: u16, nick: &str) -> Result<(), TransportError> {
        self.conn = None;

        let stream = TcpStream::connect((server, port))
            .await
            .map_err(|e| TransportError::ConnectFailed {
                server: server.to_string(),
                port,
                reason: e.to_string(),
            })?;
        let (read_half, write_half) = stream.into_split();
        let mut conn = Connection {
            reader: BufReader::new(read_half),
            writer: write_half,
            partial: Vec::new(),
        };

        conn.write_line(&format!("NICK {nick}")).await?;
        conn.write_line(&format!("USER {nick} 0 * :{nick}")).await?;
        await_welcome(&mut conn).await?;

        info!(server = %server, port, nick = %nick, "Registered with IRC server");
        self.nick = nick.to_string();
        self.conn = Some(conn);
        Ok(())
    }

    async fn join(&mut self, channel: &str) -> Result<(), TransportError> {
        self.send_line(&format!("JOIN {channel}")).await
    }

    async fn send_message(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send_to("PRIVMSG", target, text).await
    }

    async fn send_notice(&mut self, target: &str, text: &str) -> Result<(), TransportError> {
        self.send_to("NOTICE", target, text).await
    }

    async fn drain_events_once(&mut self) -> Result<Vec<InboundEvent>, TransportError> {
        let deadline = Instant::now() + self.drain_wait;
        let conn = self.conn.as_mut().ok_or(TransportError::NotConnected)?;

        let result = drain(conn, &self.nick, deadline).await;
        if result.is_err() {
            self.conn = None;
        }
        result
    }
}

async fn await_welcome(conn: &mut Connection) -> Result<(), TransportError> {
    let deadline = Instant::now() + REGISTRATION_TIMEOUT;
    loop {
        let Some(line) = conn.read_line(deadline).await? else {
            return Err(TransportError::ConnectionLost(
                "timed out waiting for registration".to_string(),
            ));
        };
        let Some(message) = parse_line(&line) else {
            continue;
        };
        match message.command.as_str() {
            "001" => return Ok(()),
            "PING" => conn.pong(&message).await?,
            "ERROR" => {
                return Err(TransportError::ConnectionLost(message.params.join(" ")));
            }
            numeric if REFUSED_REGISTRATION.contains(&numeric) => {
                return Err(TransportError::Registration(format!(
                    "{} {}",
                    numeric,
                    message.params.join(" ")
                )));
            }
            _ => {}
        }
    }
}

async fn drain(
    conn: &mut Connection,
    nick: &str,
    deadline: Instant,
) -> Result<Vec<InboundEvent>, TransportError> {
    let mut events = Vec::new();
    while let Some(line) = conn.read_line(deadline).await? {
        let Some(message) = parse_line(&line) else {
            continue;
        };
        match message.command.as_str() {
            "PING" => conn.pong(&message).await?,
            "ERROR" => {
                return Err(TransportError::ConnectionLost(message.params.join(" ")));
            }
            _ => events.push(to_event(message, &line, nick)),
        }
    }
    if !events.is_empty() {
        debug!(count = events.len(), "Drained inbound events");
    }
    Ok(events)
}

fn to_event(message: Message, line: &str, nick: &str) -> InboundEvent {
    let to_us = message
        .params
        .first()
        .is_some_and(|target| target.eq_ignore_ascii_case(nick));

    match (message.command.as_str(), to_us) {
        ("PRIVMSG", true) if message.params.len() >= 2 => {
            let source = message.prefix.unwrap_or_default();
            let text = &message.params[1];
            match text
                .strip_prefix('\u{01}')
                .map(|t| t.strip_suffix('\u{01}').unwrap_or(t))
            {
                Some(command) => InboundEvent::Ctcp {
                    source,
                    command: command.to_string(),
                },
                None => InboundEvent::PrivateMessage {
                    source,
                    text: text.clone(),
                },
            }
        }
        ("MODE", true) if message.params.len() >= 2 => InboundEvent::UserMode {
            modes: message.params[1..].join(" "),
        },
        _ => InboundEvent::Other(line.to_string()),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn parse_full_line() {
        let msg = parse_line(":alice!~a@host PRIVMSG feedbridge :follow bob\r\n").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice!~a@host"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["feedbridge", "follow bob"]);
    }

    #[test]
    fn parse_without_prefix() {
        let msg = parse_line("PING :irc.example.net").unwrap();
        assert!(msg.prefix.is_none());
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net"]);
    }

    #[test]
    fn parse_middle_params_and_numeric() {
        let msg = parse_line(":srv 433 * feedbridge :Nickname is already in use").unwrap();
        assert_eq!(msg.command, "433");
        assert_eq!(msg.params, vec!["*", "feedbridge", "Nickname is already in use"]);
    }

    #[test]
    fn parse_skips_tags_and_keeps_empty_trailing() {
        let msg = parse_line("@time=2020-01-01T00:00:00Z :a!b@c PRIVMSG #x :").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#x", ""]);
    }

    #[test]
    fn parse_blank_is_none() {
        assert!(parse_line("").is_none());
        assert!(parse_line("\r\n").is_none());
        assert!(parse_line(":prefix.only").is_none());
    }

    #[test]
    fn private_messages_and_ctcp_are_recognized() {
        let line = ":alice!a@h PRIVMSG FeedBridge :hello there";
        assert_eq!(
            to_event(parse_line(line).unwrap(), line, "feedbridge"),
            InboundEvent::PrivateMessage {
                source: "alice!a@h".to_string(),
                text: "hello there".to_string(),
            }
        );

        let line = ":alice!a@h PRIVMSG feedbridge :\u{01}VERSION\u{01}";
        assert_eq!(
            to_event(parse_line(line).unwrap(), line, "feedbridge"),
            InboundEvent::Ctcp {
                source: "alice!a@h".to_string(),
                command: "VERSION".to_string(),
            }
        );
    }

    #[test]
    fn channel_messages_are_other() {
        let line = ":alice!a@h PRIVMSG #news :follow bob";
        assert_eq!(
            to_event(parse_line(line).unwrap(), line, "feedbridge"),
            InboundEvent::Other(line.to_string())
        );
    }

    #[test]
    fn own_mode_change_is_user_mode() {
        let line = ":feedbridge MODE feedbridge :+i";
        assert_eq!(
            to_event(parse_line(line).unwrap(), line, "feedbridge"),
            InboundEvent::UserMode {
                modes: "+i".to_string()
            }
        );
    }

    /// Accept one client, answer registration with `welcome`, then run `script`
    async fn fake_server<F, Fut>(welcome: &'static str, script: F) -> u16
    where
        F: FnOnce(BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            // NICK and USER
            for _ in 0..2 {
                line.clear();
                reader.read_line(&mut line).await.unwrap();
            }
            write_half.write_all(welcome.as_bytes()).await.unwrap();
            script(reader, write_half).await;
        });
        port
    }

    #[tokio::test]
    async fn connect_drain_and_pong() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let port = fake_server(":srv 001 feedbridge :Welcome\r\n", |mut reader, mut writer| async move {
            writer
                .write_all(b"PING :keepalive\r\n:alice!a@h PRIVMSG feedbridge :follow bob\r\n")
                .await
                .unwrap();
            let mut pong = String::new();
            reader.read_line(&mut pong).await.unwrap();
            tx.send(pong).unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        let mut irc = IrcConnection::new(Duration::from_millis(300));
        irc.connect("127.0.0.1", port, "feedbridge").await.unwrap();
        assert!(irc.is_connected());

        let events = irc.drain_events_once().await.unwrap();
        assert_eq!(
            events,
            vec![InboundEvent::PrivateMessage {
                source: "alice!a@h".to_string(),
                text: "follow bob".to_string(),
            }]
        );
        assert_eq!(rx.await.unwrap(), "PONG :keepalive\r\n");
    }

    #[tokio::test]
    async fn outbound_lines_are_single_and_bounded() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let port = fake_server(":srv 001 feedbridge :Welcome\r\n", |mut reader, _writer| async move {
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            tx.send(line).unwrap();
        })
        .await;

        let mut irc = IrcConnection::new(Duration::from_millis(50));
        irc.connect("127.0.0.1", port, "feedbridge").await.unwrap();
        let long = format!("line one\r\nline two {}", "x".repeat(600));
        irc.send_message("#news", &long).await.unwrap();

        let line = rx.await.unwrap();
        assert!(line.starts_with("PRIVMSG #news :line one  line two"));
        assert!(line.ends_with("\r\n"));
        assert_eq!(line.len(), MAX_LINE_BYTES);
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[tokio::test]
    async fn server_close_is_connection_lost() {
        let port = fake_server(":srv 001 feedbridge :Welcome\r\n", |_reader, _writer| async {}).await;

        let mut irc = IrcConnection::new(Duration::from_millis(500));
        irc.connect("127.0.0.1", port, "feedbridge").await.unwrap();

        let err = irc.drain_events_once().await.unwrap_err();
        assert!(err.is_connection_loss());
        assert!(!irc.is_connected());
        assert!(matches!(
            irc.send_message("#news", "hi").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn overlong_inbound_line_drops_the_connection() {
        let port = fake_server(":srv 001 feedbridge :Welcome\r\n", |_reader, mut writer| async move {
            let flood = vec![b'a'; MAX_INBOUND_LINE_BYTES + 100];
            writer.write_all(&flood).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        let mut irc = IrcConnection::new(Duration::from_millis(500));
        irc.connect("127.0.0.1", port, "feedbridge").await.unwrap();

        match irc.drain_events_once().await {
            Err(TransportError::ConnectionLost(reason)) => assert!(reason.contains("exceeds")),
            other => panic!("expected connection loss, got {other:?}"),
        }
        assert!(!irc.is_connected());
    }

    #[tokio::test]
    async fn nickname_in_use_is_registration_error() {
        let port = fake_server(
            ":srv 433 * feedbridge :Nickname is already in use\r\n",
            |_reader, _writer| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            },
        )
        .await;

        let mut irc = IrcConnection::new(Duration::from_millis(50));
        match irc.connect("127.0.0.1", port, "feedbridge").await {
            Err(TransportError::Registration(reason)) => assert!(reason.starts_with("433")),
            other => panic!("expected registration error, got {other:?}"),
        }
        assert!(!irc.is_connected());
    }

    #[tokio::test]
    async fn refused_connection_is_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut irc = IrcConnection::new(Duration::from_millis(50));
        assert!(matches!(
            irc.connect("127.0.0.1", port, "feedbridge").await,
            Err(TransportError::ConnectFailed { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_target_is_send_failed() {
        let port = fake_server(":srv 001 feedbridge :Welcome\r\n", |_reader, _writer| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        let mut irc = IrcConnection::new(Duration::from_millis(50));
        irc.connect("127.0.0.1", port, "feedbridge").await.unwrap();
        let err = irc.send_message("bad target", "hi").await.unwrap_err();
        assert!(matches!(err, TransportError::SendFailed { .. }));
        assert!(irc.is_connected());
    }
}
