use super::legacy_server::{exchange, parse_legacy_response, LegacyServer};
use crate::{conf::Conf, share::Target, socket::StreamSocket, MspErr};
use tokio::net::TcpStream;

/// The alias of [LegacyServer] is identical in content.
pub type NettyServer = LegacyServer;

const PING_HOST_CHANNEL: &str = "MC|PingHost";
/// Protocol version announced in the plugin message, 74 is 1.6.2.
const PING_HOST_PROTOCOL: u8 = 0x4A;

/// Get the status of a [1.6](https://wiki.vg/Server_List_Ping#1.6) server.
///
/// The request carries the queried host and port in a `MC|PingHost` plugin message,
/// the response is laid out like the 1.4 to 1.5 one.
pub async fn get_netty_server_status(conf: &Conf) -> Result<NettyServer, MspErr> {
    let (target, data) = exchange(conf, write_ping_host).await?;
    let fields = parse_legacy_response(&data)?;

    LegacyServer::from_fields(target, fields)
}

fn write_ping_host(socket: &mut StreamSocket<TcpStream>, target: &Target) {
    let host_units = target.host.encode_utf16().count() as u16;

    socket.write_bytes(&[0xFE, 0x01, 0xFA]);
    socket.write_u16_be(PING_HOST_CHANNEL.len() as u16);
    socket.write_utf16_be(PING_HOST_CHANNEL);
    // Protocol byte, host length, host, port
    socket.write_u16_be(7 + 2 * host_units);
    socket.write_u8(PING_HOST_PROTOCOL);
    socket.write_u16_be(host_units);
    socket.write_utf16_be(&target.host);
    socket.write_i32_be(target.port as i32);
}
