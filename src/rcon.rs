//! [RCON](https://wiki.vg/RCON) session.
//!
//! After a successful [Rcon::login] a background task owns the read half of the
//! connection and forwards every console message over a channel. Callers correlate
//! replies with their commands by request ID, see [Rcon::response].

use crate::{
    conf::Conf,
    share::{create_tcp_socket, validate_conf, validate_not_empty, with_timeout},
    socket::{Inbound, StreamSocket},
    MspErr,
};
use serde::Serialize;
use std::{collections::VecDeque, time::Duration};
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, trace, warn};

const TYPE_RESPONSE_VALUE: i32 = 0;
const TYPE_EXEC_COMMAND: i32 = 2;
const TYPE_AUTH_RESPONSE: i32 = 2;
const TYPE_AUTH: i32 = 3;
/// Request ID, type and the two trailing NULs.
const PACKET_OVERHEAD: i32 = 10;
/// Unclaimed replies kept before the oldest is dropped.
pub const MAXIMUM_BACKLOG: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconState {
    Disconnected,
    Connecting,
    /// Connected but not logged in.
    Connected,
    LoggedIn,
    Closed,
}

/// Console output the server sent for a request.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub request_id: i32,
    pub message: String,
}

struct Packet {
    request_id: i32,
    packet_type: i32,
    body: String,
}

pub struct Rcon {
    state: RconState,
    request_id: i32,
    timeout: Duration,
    /// Whole connection between connect and login.
    socket: Option<StreamSocket<TcpStream>>,
    writer: Option<StreamSocket<OwnedWriteHalf>>,
    messages: Option<mpsc::UnboundedReceiver<Message>>,
    /// Messages received while waiting for another request ID, at most [MAXIMUM_BACKLOG].
    backlog: VecDeque<Message>,
    read_task: Option<JoinHandle<()>>,
}

impl Default for Rcon {
    fn default() -> Self {
        Self::new()
    }
}

impl Rcon {
    pub fn new() -> Self {
        Self {
            state: RconState::Disconnected,
            request_id: 0,
            timeout: crate::share::DEFAULT_TIMEOUT,
            socket: None,
            writer: None,
            messages: None,
            backlog: VecDeque::new(),
            read_task: None,
        }
    }

    pub fn state(&self) -> RconState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, RconState::Connected | RconState::LoggedIn)
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == RconState::LoggedIn
    }

    fn next_request_id(&mut self) -> i32 {
        let request_id = self.request_id;

        self.request_id = self.request_id.wrapping_add(1);

        request_id
    }

    /// Connect to the RCON port. The conf's timeout also bounds [Rcon::login].
    pub async fn connect(&mut self, conf: &Conf) -> Result<(), MspErr> {
        if self.state != RconState::Disconnected {
            return Err(MspErr::InvalidState("connect() is only valid once, before anything else"));
        }

        validate_conf(conf)?;

        self.state = RconState::Connecting;
        self.timeout = conf.timeout();

        let deadline = tokio::time::Instant::now() + self.timeout;

        match create_tcp_socket(&conf.host, conf.port, deadline).await {
            Ok(socket) => {
                self.socket = Some(socket);
                self.state = RconState::Connected;

                Ok(())
            }
            Err(err) => {
                self.state = RconState::Closed;

                Err(err)
            }
        }
    }

    /// Authenticate, then start reading console messages in the background.
    ///
    /// A wrong password closes the session.
    pub async fn login(&mut self, password: &str) -> Result<(), MspErr> {
        validate_not_empty("password", password)?;

        if self.state != RconState::Connected {
            return Err(MspErr::InvalidState("login() attempted before RCON has connected"));
        }

        let Some(mut socket) = self.socket.take() else {
            return Err(MspErr::InvalidState("login() attempted before RCON has connected"));
        };
        let request_id = self.next_request_id();

        write_packet(&mut socket, request_id, TYPE_AUTH, password);

        let result = with_timeout(self.timeout, async {
            socket.flush(false).await?;
            authenticate(&mut socket).await
        })
        .await;

        if let Err(err) = result {
            socket.close().await;
            self.state = RconState::Closed;

            return Err(err);
        }

        let (reader, writer) = socket.into_split();
        let (sender, receiver) = mpsc::unbounded_channel();

        self.read_task = Some(tokio::spawn(read_loop(reader, sender)));
        self.writer = Some(writer);
        self.messages = Some(receiver);
        self.state = RconState::LoggedIn;
        debug!(request_id, "rcon logged in");

        Ok(())
    }

    /// Send a command and return its request ID without waiting for the reply.
    pub async fn run(&mut self, command: &str) -> Result<i32, MspErr> {
        validate_not_empty("command", command)?;

        if self.state != RconState::LoggedIn {
            return Err(MspErr::InvalidState("run() attempted before RCON has successfully logged in"));
        }

        let request_id = self.next_request_id();
        let Some(writer) = self.writer.as_mut() else {
            return Err(MspErr::InvalidState("run() attempted on a closed session"));
        };

        write_packet(writer, request_id, TYPE_EXEC_COMMAND, command);
        writer.flush(false).await?;
        trace!(request_id, "rcon command sent");

        Ok(request_id)
    }

    /// Wait for the reply to `request_id`. Replies to other requests are kept for later.
    ///
    /// There is no timeout, wrap the call if one is needed. At most [MAXIMUM_BACKLOG]
    /// unclaimed replies are kept, older ones are dropped, so claim replies or drain
    /// them with [Rcon::next_message].
    pub async fn response(&mut self, request_id: i32) -> Result<String, MspErr> {
        if let Some(idx) = self.backlog.iter().position(|m| m.request_id == request_id) {
            if let Some(message) = self.backlog.remove(idx) {
                return Ok(message.message);
            }
        }

        let Some(messages) = self.messages.as_mut() else {
            return Err(MspErr::InvalidState("response() attempted before RCON has successfully logged in"));
        };

        loop {
            match messages.recv().await {
                Some(message) if message.request_id == request_id => return Ok(message.message),
                Some(message) => Self::stash(&mut self.backlog, message),
                None => return Err(MspErr::ConnectionClosed),
            }
        }
    }

    fn stash(backlog: &mut VecDeque<Message>, message: Message) {
        if backlog.len() >= MAXIMUM_BACKLOG {
            if let Some(dropped) = backlog.pop_front() {
                warn!(request_id = dropped.request_id, "rcon backlog full, dropping oldest reply");
            }
        }

        backlog.push_back(message);
    }

    /// [Rcon::run] followed by [Rcon::response].
    pub async fn execute(&mut self, command: &str) -> Result<String, MspErr> {
        let request_id = self.run(command).await?;

        self.response(request_id).await
    }

    /// Next console message in arrival order, whichever request it belongs to.
    pub async fn next_message(&mut self) -> Result<Message, MspErr> {
        if let Some(message) = self.backlog.pop_front() {
            return Ok(message);
        }

        let Some(messages) = self.messages.as_mut() else {
            return Err(MspErr::InvalidState("next_message() attempted before RCON has successfully logged in"));
        };

        messages.recv().await.ok_or(MspErr::ConnectionClosed)
    }

    /// Idempotent, valid from any state.
    pub async fn close(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }

        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }

        if let Some(mut writer) = self.writer.take() {
            writer.close().await;
        }

        self.messages = None;
        self.state = RconState::Closed;
    }
}

impl Drop for Rcon {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

fn write_packet<T>(socket: &mut StreamSocket<T>, request_id: i32, packet_type: i32, body: &str) {
    socket.write_i32_le(PACKET_OVERHEAD + body.len() as i32);
    socket.write_i32_le(request_id);
    socket.write_i32_le(packet_type);
    socket.write_string_bytes(body);
    socket.write_bytes(&[0x00, 0x00]);
}

async fn read_packet<T: Inbound>(socket: &mut StreamSocket<T>) -> Result<Packet, MspErr> {
    let length = socket.read_i32_le().await?;

    if length < PACKET_OVERHEAD {
        return Err(MspErr::MalformedResponse(format!(
            "RCON packet length {} is shorter than its header",
            length
        )));
    }

    socket.ensure_buffered(length as usize).await?;

    let request_id = socket.read_i32_le().await?;
    let packet_type = socket.read_i32_le().await?;
    let body = socket.read_bytes(length as usize - 8).await?;

    Ok(Packet {
        request_id,
        packet_type,
        body: String::from_utf8_lossy(&body[..body.len() - 2]).into_owned(),
    })
}

async fn authenticate<T: Inbound>(socket: &mut StreamSocket<T>) -> Result<(), MspErr> {
    loop {
        let packet = read_packet(socket).await?;

        if packet.request_id == -1 {
            return Err(MspErr::InvalidPassword);
        }

        match packet.packet_type {
            TYPE_AUTH_RESPONSE => return Ok(()),
            // Some servers send an empty response value ahead of the auth response.
            TYPE_RESPONSE_VALUE => continue,
            received => {
                return Err(MspErr::UnexpectedPacketType {
                    expected: TYPE_AUTH_RESPONSE,
                    received,
                })
            }
        }
    }
}

async fn read_loop(mut reader: StreamSocket<OwnedReadHalf>, sender: mpsc::UnboundedSender<Message>) {
    loop {
        let packet = match read_packet(&mut reader).await {
            Ok(packet) => packet,
            Err(MspErr::ConnectionClosed) => {
                debug!("rcon connection closed");

                return;
            }
            Err(err) => {
                warn!(%err, "rcon read loop stopped");

                return;
            }
        };

        if packet.packet_type != TYPE_RESPONSE_VALUE {
            warn!(
                request_id = packet.request_id,
                packet_type = packet.packet_type,
                "discarding unexpected rcon packet"
            );

            continue;
        }

        let message = Message {
            request_id: packet.request_id,
            message: packet.body,
        };

        if sender.send(message).is_err() {
            // Session dropped its receiver.
            return;
        }
    }
}
