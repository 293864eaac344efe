use crate::{
    conf::{BedrockOptions, Conf},
    motd::{format_legacy_markup, Motd},
    share::{
        create_udp_socket, get_server_current_time, resolve_target, validate_conf, with_timeout,
    },
    srv::{SrvProtocol, SrvRecord},
    MspErr,
};
use serde::Serialize;
use tracing::debug;

const MAGIC_BYTES: &[u8] = &[
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];
const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1C;

/// Bedrock server info type.
///
/// For the meaning of `motd_line_1` and `motd_line_2` refer to the following examples and images:
///
/// ```text
/// motd_line_1 = "Dedicated Server"
/// motd_line_2 = "Bedrock level"
/// ```
/// Result:
///
/// <img src="https://wiki.vg/images/b/bb/Server_ID_String_Example.png" alt="Server ID String Example.png" />
#[derive(Serialize, Debug, Clone)]
pub struct BedrockServer {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    /// MCPE or MCEE(Education Edition) for Education Edition
    pub edition: String,
    /// Server GUID from the pong header.
    pub server_guid: i64,
    /// MOTD line 1 for upstream display.
    pub motd_line_1: String,
    /// MOTD line 2 for downstream display, missing on older servers.
    pub motd_line_2: Option<String>,
    /// Both MOTD lines joined by a newline.
    pub motd: Motd,
    /// Protocol version.
    pub protocol_version: i32,
    /// Version name.
    pub version_name: String,
    pub online_players: i32,
    pub max_players: i32,
    /// Server unique id.
    pub server_id: Option<String>,
    pub game_mode: Option<String>,
    pub game_mode_id: Option<i32>,
    /// Ports required to connect to the server using IPv4.
    pub port_ipv4: Option<u16>,
    /// Ports required to connect to the server using IPv6.
    pub port_ipv6: Option<u16>,
}

impl std::fmt::Display for BedrockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

/// `;` delimited server ID string of the pong.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServerInfo {
    edition: String,
    motd_line_1: String,
    protocol_version: i32,
    version_name: String,
    online_players: i32,
    max_players: i32,
    server_id: Option<String>,
    motd_line_2: Option<String>,
    game_mode: Option<String>,
    game_mode_id: Option<i32>,
    port_ipv4: Option<u16>,
    port_ipv6: Option<u16>,
}

/// Fields up to the max players are always sent.
const REQUIRED_PARTS: usize = 6;

fn parse_server_info(server_info: &str) -> Result<ServerInfo, MspErr> {
    let parts = server_info.split(';').collect::<Vec<_>>();

    if parts.len() < REQUIRED_PARTS {
        return Err(MspErr::MalformedResponse(format!(
            "expected at least {} parts of server information, got {}",
            REQUIRED_PARTS,
            parts.len()
        )));
    }

    // Older servers stop anywhere after the max players.
    let text = |idx: usize| -> Option<String> {
        parts
            .get(idx)
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.to_string())
    };
    let number = |idx: usize| -> Result<Option<i32>, MspErr> {
        match parts.get(idx).map(|p| p.trim()) {
            Some(p) if !p.is_empty() => Ok(Some(p.parse()?)),
            _ => Ok(None),
        }
    };
    let port = |idx: usize| -> Result<Option<u16>, MspErr> {
        match parts.get(idx).map(|p| p.trim()) {
            Some(p) if !p.is_empty() => Ok(Some(p.parse()?)),
            _ => Ok(None),
        }
    };

    Ok(ServerInfo {
        edition: parts[0].into(),
        motd_line_1: parts[1].into(),
        protocol_version: parts[2].trim().parse()?,
        version_name: parts[3].into(),
        online_players: parts[4].trim().parse()?,
        max_players: parts[5].trim().parse()?,
        server_id: text(6),
        motd_line_2: text(7),
        game_mode: text(8),
        game_mode_id: number(9)?,
        port_ipv4: port(10)?,
        port_ipv6: port(11)?,
    })
}

/// Get the status of a Bedrock server with a RakNet unconnected ping.
pub async fn get_bedrock_server_status(
    conf: &Conf,
    options: &BedrockOptions,
) -> Result<BedrockServer, MspErr> {
    validate_conf(conf)?;

    with_timeout(conf.timeout(), async {
        let target = resolve_target(conf, SrvProtocol::Udp).await;
        let mut socket = create_udp_socket(&target.host, target.port, &conf.socket_conf).await?;
        let client_guid = options.client_guid.unwrap_or_else(rand::random);

        socket.write_u8(UNCONNECTED_PING);
        socket.write_i64_be(get_server_current_time() as i64);
        socket.write_bytes(MAGIC_BYTES);
        socket.write_u32_be(client_guid);
        socket.flush(false).await?;

        let packet_id = socket.read_u8().await?;

        if packet_id != UNCONNECTED_PONG {
            return Err(MspErr::UnexpectedPacketType {
                expected: UNCONNECTED_PONG as i32,
                received: packet_id as i32,
            });
        }

        // Echoed time
        socket.skip(8).await?;

        let server_guid = socket.read_i64_be().await?;

        socket.skip(MAGIC_BYTES.len()).await?;

        let length = socket.read_u16_be().await?;
        let info = parse_server_info(&socket.read_string(length as usize).await?)?;

        socket.close().await;
        debug!(host = %target.host, port = target.port, server_guid, "bedrock status done");

        Ok(BedrockServer {
            host: target.host,
            port: target.port,
            srv_record: target.srv_record,
            motd: match &info.motd_line_2 {
                Some(line_2) => format_legacy_markup(&format!("{}\n{}", info.motd_line_1, line_2)),
                None => format_legacy_markup(&info.motd_line_1),
            },
            edition: info.edition,
            server_guid,
            motd_line_1: info.motd_line_1,
            motd_line_2: info.motd_line_2,
            protocol_version: info.protocol_version,
            version_name: info.version_name,
            online_players: info.online_players,
            max_players: info.max_players,
            server_id: info.server_id,
            game_mode: info.game_mode,
            game_mode_id: info.game_mode_id,
            port_ipv4: info.port_ipv4,
            port_ipv6: info.port_ipv6,
        })
    })
    .await
}
