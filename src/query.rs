use crate::{
    conf::{Conf, QueryOptions},
    motd::{format_legacy_markup, Motd},
    share::{create_udp_socket, resolve_target, validate_conf, with_timeout, Target},
    socket::{Datagram, Inbound, StreamSocket},
    srv::{SrvProtocol, SrvRecord},
    MspErr,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Only the low nibble of every session ID byte is significant.
const SESSION_ID_MASK: i32 = 0x0F0F0F0F;
const MAGIC: u16 = 0xFEFD;
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
/// Full query except the payload must be padded to 8 bytes.
const FULL_STAT_PADDING: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
/// `splitnum\0\x80\0` before the key/value section.
const KV_SECTION_PADDING: usize = 11;
/// `\x01player_\0\0` before the player section.
const PLAYER_SECTION_PADDING: usize = 10;

/// Byte sequences that can follow the `hostname` value, which may itself hold NULs.
const HOSTNAME_TERMINATORS: [&[u8]; 10] = [
    b"gametype",
    b"game_id",
    b"version",
    b"plugins",
    b"map",
    b"numplayers",
    b"maxplayers",
    b"hostport",
    b"hostip",
    b"\x00\x01player_",
];

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPlayers {
    pub online: i32,
    pub max: i32,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct QueryFullPlayers {
    pub online: i32,
    pub max: i32,
    pub list: Vec<String>,
}

/// Result of a [basic stat](https://wiki.vg/Query#Basic_stat).
#[derive(Serialize, Debug, Clone)]
pub struct QueryBasic {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    pub motd: Motd,
    pub game_type: String,
    pub map: String,
    pub players: QueryPlayers,
    /// Port as reported by the server.
    pub host_port: u16,
    /// IP as reported by the server.
    pub host_ip: String,
}

/// Result of a [full stat](https://wiki.vg/Query#Full_stat).
#[derive(Serialize, Debug, Clone)]
pub struct QueryFull {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
    pub motd: Motd,
    pub version: String,
    /// Server software, the part of `plugins` before the first `:`.
    pub software: String,
    pub plugins: Vec<String>,
    pub map: String,
    pub game_type: String,
    pub game_id: String,
    pub players: QueryFullPlayers,
    pub host_ip: String,
    pub host_port: u16,
}

impl std::fmt::Display for QueryBasic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

impl std::fmt::Display for QueryFull {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

/// Split `<software>: <plugin>; <plugin>...` into the software name and the plugins.
///
/// Vanilla servers send an empty string.
pub fn split_plugins(plugins: &str) -> (String, Vec<String>) {
    let mut parts = plugins
        .split([':', ';'])
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .map(String::from);
    let software = parts.next().unwrap_or_default();

    (software, parts.collect())
}

/// Send the handshake and return the challenge token.
async fn handshake(socket: &mut StreamSocket<Datagram>, session_id: i32) -> Result<i32, MspErr> {
    socket.write_u16_be(MAGIC);
    socket.write_u8(TYPE_HANDSHAKE);
    socket.write_i32_be(session_id);
    socket.flush(false).await?;

    read_header(socket, TYPE_HANDSHAKE, session_id).await?;

    let token = socket.read_string_nt().await?;

    // Tokens are sent as decimal text and may not fit an i32, only the low bits are echoed.
    match token.trim().parse::<i64>() {
        Ok(token) => Ok(token as i32),
        Err(_) => Err(MspErr::InvalidChallengeToken(token)),
    }
}

async fn read_header<T: Inbound>(
    socket: &mut StreamSocket<T>,
    expected_type: u8,
    session_id: i32,
) -> Result<(), MspErr> {
    let packet_type = socket.read_u8().await?;

    if packet_type != expected_type {
        return Err(MspErr::UnexpectedPacketType {
            expected: expected_type as i32,
            received: packet_type as i32,
        });
    }

    let received = socket.read_i32_be().await?;

    if received != session_id {
        return Err(MspErr::SessionMismatch {
            expected: session_id,
            received,
        });
    }

    Ok(())
}

async fn send_stat_request(
    conf: &Conf,
    options: &QueryOptions,
    full_query: bool,
) -> Result<(Target, StreamSocket<Datagram>, i32), MspErr> {
    let session_id = options.session_id & SESSION_ID_MASK;
    let target = resolve_target(conf, SrvProtocol::Udp).await;
    let mut socket = create_udp_socket(&target.host, target.port, &conf.socket_conf).await?;
    let token = handshake(&mut socket, session_id).await?;

    socket.write_u16_be(MAGIC);
    socket.write_u8(TYPE_STAT);
    socket.write_i32_be(session_id);
    socket.write_i32_be(token);

    if full_query {
        socket.write_bytes(&FULL_STAT_PADDING);
    }

    socket.flush(false).await?;

    Ok((target, socket, session_id))
}

/// Basic stat response body, after the header.
struct BasicStat {
    motd: String,
    game_type: String,
    map: String,
    online: i32,
    max: i32,
    host_port: u16,
    host_ip: String,
}

async fn read_basic_stat<T: Inbound>(
    socket: &mut StreamSocket<T>,
    session_id: i32,
) -> Result<BasicStat, MspErr> {
    read_header(socket, TYPE_STAT, session_id).await?;

    Ok(BasicStat {
        motd: socket.read_string_nt_latin1().await?,
        game_type: socket.read_string_nt_latin1().await?,
        map: socket.read_string_nt_latin1().await?,
        online: socket.read_string_nt_latin1().await?.parse()?,
        max: socket.read_string_nt_latin1().await?.parse()?,
        host_port: socket.read_u16_le().await?,
        host_ip: socket.read_string_nt_latin1().await?,
    })
}

/// Full stat response body, after the header.
struct FullStat {
    data: HashMap<String, String>,
    players: Vec<String>,
}

async fn read_full_stat<T: Inbound>(
    socket: &mut StreamSocket<T>,
    session_id: i32,
) -> Result<FullStat, MspErr> {
    read_header(socket, TYPE_STAT, session_id).await?;

    // Drop meaningless byte padding
    socket.skip(KV_SECTION_PADDING).await?;

    let mut data = HashMap::new();

    loop {
        let key = socket.read_string_nt_latin1().await?;

        if key.is_empty() {
            break;
        }

        let value = match key.as_str() {
            "hostname" => {
                socket
                    .read_string_nt_followed_by(&HOSTNAME_TERMINATORS)
                    .await?
            }
            _ => socket.read_string_nt_latin1().await?,
        };

        data.insert(key, value);
    }

    socket.skip(PLAYER_SECTION_PADDING).await?;

    let mut players = Vec::new();

    loop {
        let name = socket.read_string_nt_latin1().await?;

        if name.is_empty() {
            break;
        }

        players.push(name);
    }

    Ok(FullStat { data, players })
}

/// Get basic [status](https://wiki.vg/Query#Basic_stat)
pub async fn query_basic_status(conf: &Conf, options: &QueryOptions) -> Result<QueryBasic, MspErr> {
    validate_conf(conf)?;

    with_timeout(conf.timeout(), async {
        let (target, mut socket, session_id) = send_stat_request(conf, options, false).await?;
        let stat = read_basic_stat(&mut socket, session_id).await?;

        socket.close().await;
        debug!(host = %target.host, port = target.port, "basic query done");

        Ok(QueryBasic {
            host: target.host,
            port: target.port,
            srv_record: target.srv_record,
            motd: format_legacy_markup(&stat.motd),
            game_type: stat.game_type,
            map: stat.map,
            players: QueryPlayers {
                online: stat.online,
                max: stat.max,
            },
            host_port: stat.host_port,
            host_ip: stat.host_ip,
        })
    })
    .await
}

/// Get full [status](https://wiki.vg/Query#Full_stat)
pub async fn query_full_status(conf: &Conf, options: &QueryOptions) -> Result<QueryFull, MspErr> {
    validate_conf(conf)?;

    with_timeout(conf.timeout(), async {
        let (target, mut socket, session_id) = send_stat_request(conf, options, true).await?;
        let FullStat { mut data, players } = read_full_stat(&mut socket, session_id).await?;

        socket.close().await;
        debug!(host = %target.host, port = target.port, players = players.len(), "full query done");

        let mut take = |key: &str| data.remove(key).unwrap_or_default();
        let (software, plugins) = split_plugins(&take("plugins"));

        Ok(QueryFull {
            host: target.host,
            port: target.port,
            srv_record: target.srv_record,
            motd: format_legacy_markup(&take("hostname")),
            version: take("version"),
            software,
            plugins,
            map: take("map"),
            game_type: take("gametype"),
            game_id: take("game_id"),
            players: QueryFullPlayers {
                online: take("numplayers").parse()?,
                max: take("maxplayers").parse()?,
                list: players,
            },
            host_ip: take("hostip"),
            host_port: take("hostport").parse()?,
        })
    })
    .await
}
