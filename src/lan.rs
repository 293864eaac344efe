use crate::{
    conf::LanOptions,
    motd::{format_legacy_markup, Motd},
    MspErr,
};
use serde::Serialize;
use std::net::Ipv4Addr;
use tokio::{net::UdpSocket, time::Instant};
use tracing::{debug, warn};

const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 2, 60);
const MULTICAST_PORT: u16 = 4445;
const MAXIMUM_SERVERS: usize = 100;
const DEFAULT_SERVER_PORT: u16 = 25565;
const MOTD_TAGS: (&str, &str) = ("[MOTD]", "[/MOTD]");
const AD_TAGS: (&str, &str) = ("[AD]", "[/AD]");

/// A world opened to LAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanServer {
    /// Address the broadcast came from.
    pub host: String,
    /// Advertised game port.
    pub port: u16,
    pub motd: Motd,
}

impl std::fmt::Display for LanServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

fn between<'a>(message: &'a str, (open, close): (&str, &str)) -> Option<&'a str> {
    let start = message.find(open)? + open.len();
    let end = start + message[start..].find(close)?;

    Some(&message[start..end])
}

/// Extract MOTD and port from `[MOTD]<motd>[/MOTD][AD]<port>[/AD]`.
///
/// A port that is not a number falls back to 25565.
fn parse_broadcast_message(message: &str) -> Option<(&str, u16)> {
    let motd = between(message, MOTD_TAGS)?;
    let port = between(message, AD_TAGS)?;

    Some((motd, port.trim().parse().unwrap_or(DEFAULT_SERVER_PORT)))
}

/// Listen for LAN world broadcasts for `options.scan_time`.
///
/// Every server is reported once, keyed by host and port.
pub async fn scan_lan(options: &LanOptions) -> Result<Vec<LanServer>, MspErr> {
    if options.scan_time.is_zero() {
        return Err(MspErr::Validation("scan time must be greater than 0".into()));
    }

    let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, MULTICAST_PORT))?;

    socket.join_multicast_v4(&MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_nonblocking(true)?;

    let socket = UdpSocket::from_std(socket)?;
    let deadline = Instant::now() + options.scan_time;
    let mut servers = Vec::<LanServer>::new();
    let mut buffer = [0u8; 1024];

    loop {
        let (size, src_addr) =
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buffer)).await {
                Ok(received) => received?,
                Err(_) => break,
            };
        let message = String::from_utf8_lossy(&buffer[..size]);
        let Some((motd, port)) = parse_broadcast_message(&message) else {
            warn!(%src_addr, "skipping malformed LAN broadcast");

            continue;
        };
        let host = src_addr.ip().to_string();

        if servers.len() == MAXIMUM_SERVERS
            || servers.iter().any(|s| s.host == host && s.port == port)
        {
            continue;
        }

        debug!(%host, port, "found LAN server");
        servers.push(LanServer {
            host,
            port,
            motd: format_legacy_markup(motd),
        });
    }

    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_message() {
        assert_eq!(
            parse_broadcast_message("[MOTD]Steve - New World[/MOTD][AD]51234[/AD]"),
            Some(("Steve - New World", 51234))
        );
    }

    #[test]
    fn non_numeric_port_falls_back() {
        assert_eq!(
            parse_broadcast_message("[MOTD]World[/MOTD][AD]abc[/AD]"),
            Some(("World", 25565))
        );
    }

    #[test]
    fn malformed_broadcast() {
        assert_eq!(parse_broadcast_message("[MOTD]World[/MOTD]"), None);
        assert_eq!(parse_broadcast_message("[AD]25565[/AD][MOTD]World"), None);
        assert_eq!(parse_broadcast_message("hello"), None);
    }
}
