use crate::{
    conf::Conf,
    motd::{format_legacy_markup, Motd},
    share::{connect_tcp, validate_conf, with_deadline, Target},
    socket::{Inbound, StreamSocket},
    srv::SrvRecord,
    MspErr,
};
use serde::Serialize;
use tokio::net::TcpStream;
use tracing::debug;

const KICK_PACKET_ID: u8 = 0xFF;
const SECTION_SIGN: char = '§';

/// Server [beta 1.8 to 1.3](https://wiki.vg/Server_List_Ping#Beta_1.8_to_1.3).
#[derive(Serialize, Debug, Clone)]
pub struct LegacyBetaServer {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    pub motd: Motd,
    pub online_players: i32,
    pub max_players: i32,
}

/// Server [1.4 to 1.5](https://wiki.vg/Server_List_Ping#1.4_to_1.5).
#[derive(Serialize, Debug, Clone)]
pub struct LegacyServer {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    /// Protocol version (e.g. 47).
    pub protocol_version: i32,
    /// Minecraft server version (e.g. 1.4.2).
    pub server_version: String,
    pub motd: Motd,
    pub online_players: i32,
    pub max_players: i32,
}

/// Status of any pre-Netty server, `version` is `None` for beta servers.
#[derive(Serialize, Debug, Clone)]
pub struct LegacyStatus {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    pub version: Option<LegacyVersion>,
    pub players: LegacyPlayers,
    pub motd: Motd,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LegacyVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyPlayers {
    pub online: i32,
    pub max: i32,
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(
                        f,
                        "{}",
                        serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
                    )
                }
            }
        )*
    };
}

impl_display!(LegacyBetaServer, LegacyServer, LegacyStatus);

/// Fields decoded from a kick packet, before they are attached to an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LegacyFields {
    pub version: Option<LegacyVersion>,
    pub motd: String,
    pub online_players: i32,
    pub max_players: i32,
}

/// Parse `MOTD§online§max`.
pub(crate) fn parse_beta_response(data: &str) -> Result<LegacyFields, MspErr> {
    // The MOTD itself never holds the delimiter on beta servers, but split from
    // the right so a stray one only ends up in the MOTD.
    let fields = data.rsplitn(3, SECTION_SIGN).collect::<Vec<_>>();

    if fields.len() != 3 {
        return Err(MspErr::MalformedResponse(format!(
            "expected 3 fields delimited by §, got {}",
            fields.len()
        )));
    }

    Ok(LegacyFields {
        version: None,
        motd: fields[2].into(),
        online_players: fields[1].parse()?,
        max_players: fields[0].parse()?,
    })
}

/// Parse `§1\0protocol\0version\0motd\0online\0max`.
pub(crate) fn parse_legacy_response(data: &str) -> Result<LegacyFields, MspErr> {
    if !data.starts_with("§1") {
        return Err(MspErr::MalformedResponse(format!(
            "response must start with §1, got: {:?}",
            data.chars().take(2).collect::<String>()
        )));
    }

    // 5 pieces of information need to be returned.
    //
    // 1.Protocol version (e.g. 47)
    // 2.Minecraft server version (e.g. 1.4.2)
    // 3.Message of the day (e.g. A Minecraft Server)
    // 4.Current player count
    // 5.Max players
    let fields = data.split('\0').skip(1).collect::<Vec<_>>();

    if fields.len() != 5 {
        return Err(MspErr::MalformedResponse(format!(
            "expected 5 NUL delimited fields, got {}",
            fields.len()
        )));
    }

    Ok(LegacyFields {
        version: Some(LegacyVersion {
            name: fields[1].into(),
            protocol: fields[0].parse()?,
        }),
        motd: fields[2].into(),
        online_players: fields[3].parse()?,
        max_players: fields[4].parse()?,
    })
}

/// Pick the format by the leading `§1` marker.
pub(crate) fn parse_any_legacy_response(data: &str) -> Result<LegacyFields, MspErr> {
    match data.starts_with("§1") {
        true => parse_legacy_response(data),
        false => parse_beta_response(data),
    }
}

/// Read the `0xFF` kick packet: UTF-16BE string prefixed by its length in code units.
pub(crate) async fn read_kick_packet<T: Inbound>(
    socket: &mut StreamSocket<T>,
) -> Result<String, MspErr> {
    let packet_id = socket.read_u8().await?;

    if packet_id != KICK_PACKET_ID {
        return Err(MspErr::UnexpectedPacketType {
            expected: KICK_PACKET_ID as i32,
            received: packet_id as i32,
        });
    }

    let length = socket.read_u16_be().await?;

    socket.read_utf16_be(length as usize).await
}

/// Connect, send what `write_request` buffered, and return the kick packet text.
pub(crate) async fn exchange<F>(conf: &Conf, write_request: F) -> Result<(Target, String), MspErr>
where
    F: FnOnce(&mut StreamSocket<TcpStream>, &Target),
{
    validate_conf(conf)?;

    let deadline = tokio::time::Instant::now() + conf.timeout();
    let (target, mut socket) = connect_tcp(conf, deadline).await?;

    with_deadline(deadline, async move {
        write_request(&mut socket, &target);
        socket.flush(false).await?;

        let data = read_kick_packet(&mut socket).await?;

        socket.close().await;
        debug!(host = %target.host, port = target.port, size = data.len(), "legacy status done");

        Ok((target, data))
    })
    .await
}

impl LegacyServer {
    pub(crate) fn from_fields(target: Target, fields: LegacyFields) -> Result<Self, MspErr> {
        let Some(version) = fields.version else {
            return Err(MspErr::MalformedResponse("missing version fields".into()));
        };

        Ok(Self {
            host: target.host,
            port: target.port,
            srv_record: target.srv_record,
            protocol_version: version.protocol,
            server_version: version.name,
            motd: format_legacy_markup(&fields.motd),
            online_players: fields.online_players,
            max_players: fields.max_players,
        })
    }
}

/// Get the status of a beta 1.8 to 1.3 server.
pub async fn get_beta_legacy_server_status(conf: &Conf) -> Result<LegacyBetaServer, MspErr> {
    let (target, data) = exchange(conf, |socket, _| socket.write_u8(0xFE)).await?;
    let fields = parse_beta_response(&data)?;

    Ok(LegacyBetaServer {
        host: target.host,
        port: target.port,
        srv_record: target.srv_record,
        motd: format_legacy_markup(&fields.motd),
        online_players: fields.online_players,
        max_players: fields.max_players,
    })
}

/// Get the status of a 1.4 to 1.5 server.
pub async fn get_legacy_server_status(conf: &Conf) -> Result<LegacyServer, MspErr> {
    let (target, data) = exchange(conf, |socket, _| socket.write_bytes(&[0xFE, 0x01])).await?;
    let fields = parse_legacy_response(&data)?;

    LegacyServer::from_fields(target, fields)
}

/// Get the status of any pre-Netty server, detecting the response format.
pub async fn get_legacy_status(conf: &Conf) -> Result<LegacyStatus, MspErr> {
    let (target, data) = exchange(conf, |socket, _| socket.write_bytes(&[0xFE, 0x01])).await?;
    let fields = parse_any_legacy_response(&data)?;

    Ok(LegacyStatus {
        host: target.host,
        port: target.port,
        srv_record: target.srv_record,
        version: fields.version,
        players: LegacyPlayers {
            online: fields.online_players,
            max: fields.max_players,
        },
        motd: format_legacy_markup(&fields.motd),
    })
}
