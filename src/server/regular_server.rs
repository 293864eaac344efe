use crate::{
    conf::{Conf, StatusOptions},
    motd::{format_chat_markup, Motd},
    share::{connect_tcp, validate_conf, with_deadline, Target},
    socket::{Inbound, StreamSocket},
    srv::SrvRecord,
    MspErr,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

/// Regular Server info type.
#[derive(Serialize, Debug, Clone)]
pub struct Server {
    /// Host actually connected to, after SRV resolution.
    pub host: String,
    /// Port actually connected to, after SRV resolution.
    pub port: u16,
    /// SRV record the address came from, if any.
    pub srv_record: Option<SrvRecord>,
    /// Server version. Includes version name and protocol number.
    pub version: Option<Version>,
    /// Server Player info.
    pub players: Option<Players>,
    /// Server description, similar to MOTD.
    pub motd: Option<Motd>,
    /// Server icon, a base64 `data:image/png` URI.
    pub favicon: Option<String>,
    /// Mod list of FML servers.
    pub mod_info: Option<ModInfo>,
    /// Forge plugin server unique information, including mod and channel info.
    pub forge_data: Option<ForgeData>,
    /// Whether the server enforces secure chat.
    pub enforces_secure_chat: Option<bool>,
    /// Whether the server previews chat messages.
    pub previews_chat: Option<bool>,
    /// Time between sending the ping and receiving the pong, in milliseconds.
    pub round_trip_latency: u64,
}

impl std::fmt::Display for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Version {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Players {
    pub max: i32,
    pub online: i32,
    pub sample: Option<Vec<Player>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Player {
    pub name: String,
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ModInfo {
    #[serde(rename = "type")]
    pub mod_type: String,
    #[serde(alias = "modList", rename = "modList")]
    pub mod_list: Vec<ModInfoEntry>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ModInfoEntry {
    pub modid: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeData {
    pub mods: Vec<ForgeMod>,
    pub channels: Vec<ForgeChannel>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeMod {
    #[serde(alias = "modId", rename = "modId")]
    pub mod_id: String,
    pub modmarker: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeChannel {
    pub res: String,
    pub version: String,
    pub required: bool,
}

/// Status JSON as the server sends it. Every field may be missing.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct StatusResponse {
    version: Option<Version>,
    players: Option<Players>,
    description: Option<Value>,
    favicon: Option<String>,
    #[serde(rename = "modinfo")]
    mod_info: Option<ModInfo>,
    #[serde(rename = "forgeData")]
    forge_data: Option<ForgeData>,
    #[serde(rename = "enforcesSecureChat")]
    enforces_secure_chat: Option<bool>,
    #[serde(rename = "previewsChat")]
    previews_chat: Option<bool>,
}

/// Get the status of a 1.7+ server via [Server List Ping](https://wiki.vg/Server_List_Ping).
pub async fn get_server_status(conf: &Conf, options: &StatusOptions) -> Result<Server, MspErr> {
    validate_conf(conf)?;

    let deadline = tokio::time::Instant::now() + conf.timeout();
    let (target, mut socket) = connect_tcp(conf, deadline).await?;

    with_deadline(deadline, async move {
        // Handshake
        //
        // Next state should be 1 for status, but could also be 2 for login.
        socket.write_varint(0x00);
        socket.write_varint(options.protocol_version);
        socket.write_string_varint(&target.host);
        socket.write_u16_be(target.port);
        socket.write_varint(1);
        socket.flush(true).await?;

        // Status request
        socket.write_varint(0x00);
        socket.flush(true).await?;

        read_packet_header(&mut socket, 0x00).await?;

        let response = serde_json::from_str::<StatusResponse>(&socket.read_string_varint().await?)?;
        let round_trip_latency = get_server_ping(&mut socket).await?;

        socket.close().await;
        debug!(host = %target.host, port = target.port, round_trip_latency, "status done");

        Ok(build_server(target, response, round_trip_latency))
    })
    .await
}

/// Read a framed packet's length and type, waiting until the whole packet is buffered.
async fn read_packet_header<T: Inbound>(
    socket: &mut StreamSocket<T>,
    expected: i32,
) -> Result<(), MspErr> {
    let packet_length = socket.read_varint().await?;

    if packet_length < 0 {
        return Err(MspErr::MalformedResponse(format!(
            "negative packet length: {}",
            packet_length
        )));
    }

    socket.ensure_buffered(packet_length as usize).await?;

    match socket.read_varint().await? {
        received if received != expected => {
            Err(MspErr::UnexpectedPacketType { expected, received })
        }
        _ => Ok(()),
    }
}

async fn get_server_ping(socket: &mut StreamSocket<tokio::net::TcpStream>) -> Result<u64, MspErr> {
    let payload = rand::random::<i64>();

    socket.write_varint(0x01);
    socket.write_i64_be(payload);
    socket.flush(true).await?;

    let started = Instant::now();

    read_packet_header(socket, 0x01).await?;

    // Server should respond with the same payload as sent by the client.
    let received = socket.read_i64_be().await?;

    if received != payload {
        return Err(MspErr::PayloadMismatch {
            sent: payload,
            received,
        });
    }

    Ok(started.elapsed().as_millis() as u64)
}

fn build_server(target: Target, response: StatusResponse, round_trip_latency: u64) -> Server {
    Server {
        host: target.host,
        port: target.port,
        srv_record: target.srv_record,
        version: response.version,
        players: response.players,
        motd: response.description.as_ref().map(format_chat_markup),
        favicon: response.favicon,
        mod_info: response.mod_info,
        forge_data: response.forge_data,
        enforces_secure_chat: response.enforces_secure_chat,
        previews_chat: response.previews_chat,
        round_trip_latency,
    }
}
