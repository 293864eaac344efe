use crate::{
    conf::{Conf, SocketConf},
    socket::{Datagram, StreamSocket},
    srv::{resolve_srv, SrvProtocol, SrvRecord},
    MspErr,
};
use std::{
    future::Future,
    net::{Ipv6Addr, SocketAddr},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    net::{lookup_host, TcpStream, UdpSocket},
    time::Instant,
};
use tracing::debug;

/// Default budget for status, query, bedrock and RCON calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default budget for Votifier calls.
pub const DEFAULT_VOTE_TIMEOUT: Duration = Duration::from_secs(15);

/// Milliseconds since the Unix epoch, `0` if the clock is before it.
pub fn get_server_current_time() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(t) => u64::try_from(t.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}

/// Where a call actually connects to after optional SRV resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub srv_record: Option<SrvRecord>,
}

/// Apply SRV resolution when enabled. A failed lookup keeps the configured host and port.
pub async fn resolve_target(conf: &Conf, protocol: SrvProtocol) -> Target {
    let srv_record = match conf.socket_conf.enable_srv {
        true => resolve_srv(&conf.host, protocol).await,
        false => None,
    };

    match srv_record {
        Some(record) => {
            debug!(host = %conf.host, target = %record.host, port = record.port, "using SRV record");

            Target {
                host: record.host.clone(),
                port: record.port,
                srv_record: Some(record),
            }
        }
        None => Target {
            host: conf.host.clone(),
            port: conf.port,
            srv_record: None,
        },
    }
}

/// Connect before `deadline`. Running out of time here is a [MspErr::ConnectTimeout].
pub async fn create_tcp_socket(
    host: &str,
    port: u16,
    deadline: Instant,
) -> Result<StreamSocket<TcpStream>, MspErr> {
    let stream = with_connect_deadline(deadline, async {
        Ok(TcpStream::connect((host, port)).await?)
    })
    .await?;

    stream.set_nodelay(true)?;
    debug!(host, port, "tcp connected");

    Ok(StreamSocket::new(stream))
}

/// Resolve the SRV-aware target and connect to it, both before `deadline`.
pub async fn connect_tcp(
    conf: &Conf,
    deadline: Instant,
) -> Result<(Target, StreamSocket<TcpStream>), MspErr> {
    let target = with_connect_deadline(deadline, async {
        Ok(resolve_target(conf, SrvProtocol::Tcp).await)
    })
    .await?;
    let socket = create_tcp_socket(&target.host, target.port, deadline).await?;

    Ok((target, socket))
}

/// Bind a local UDP socket of the peer's address family and connect it to the peer.
pub async fn create_udp_socket(
    host: &str,
    port: u16,
    socket_conf: &SocketConf,
) -> Result<StreamSocket<Datagram>, MspErr> {
    let Some(peer) = lookup_host((host, port)).await?.next() else {
        return Err(MspErr::IoErr(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no address found for {}:{}", host, port),
        )));
    };
    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (socket_conf.rep_udp_ipv4, socket_conf.rep_udp_port).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, socket_conf.rep_udp_port).into(),
    };
    let socket = UdpSocket::bind(local).await?;

    socket.connect(peer).await?;
    debug!(%peer, %local, "udp socket ready");

    Ok(StreamSocket::new(Datagram(socket)))
}

/// Race `fut` against `duration`; losing the race is a [MspErr::Timeout].
///
/// Everything `fut` owns, sockets included, is dropped when the timer wins.
pub async fn with_timeout<T, F>(duration: Duration, fut: F) -> Result<T, MspErr>
where
    F: Future<Output = Result<T, MspErr>>,
{
    with_deadline(Instant::now() + duration, fut).await
}

/// [with_timeout] against a fixed point in time, for the exchange that follows a connect.
pub async fn with_deadline<T, F>(deadline: Instant, fut: F) -> Result<T, MspErr>
where
    F: Future<Output = Result<T, MspErr>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(MspErr::Timeout),
    }
}

async fn with_connect_deadline<T, F>(deadline: Instant, fut: F) -> Result<T, MspErr>
where
    F: Future<Output = Result<T, MspErr>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(MspErr::ConnectTimeout),
    }
}

/// Reject configurations no call can succeed with, before any I/O.
pub fn validate_conf(conf: &Conf) -> Result<(), MspErr> {
    if conf.host.is_empty() {
        return Err(MspErr::Validation("host must not be empty".into()));
    }

    if conf.port == 0 {
        return Err(MspErr::Validation("port must be greater than 0".into()));
    }

    if conf.socket_conf.timeout == Some(Duration::ZERO) {
        return Err(MspErr::Validation("timeout must be greater than 0".into()));
    }

    Ok(())
}

pub fn validate_not_empty(name: &str, value: &str) -> Result<(), MspErr> {
    match value.is_empty() {
        true => Err(MspErr::Validation(format!("{} must not be empty", name))),
        false => Ok(()),
    }
}

/// Minecraft usernames: 3 to 32 of `[A-Za-z0-9_]`.
pub fn validate_username(username: &str) -> Result<(), MspErr> {
    let valid = (3..=32).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');

    match valid {
        true => Ok(()),
        false => Err(MspErr::Validation(format!(
            "invalid Minecraft username: {:?}",
            username
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_conf() {
        assert!(validate_conf(&Conf::create("mc.example.com")).is_ok());
        assert!(matches!(
            validate_conf(&Conf::create("")),
            Err(MspErr::Validation(_))
        ));
        assert!(matches!(
            validate_conf(&Conf::create_with_port("mc.example.com", 0)),
            Err(MspErr::Validation(_))
        ));

        let mut conf = Conf::create("mc.example.com");
        conf.socket_conf.timeout = Some(Duration::ZERO);

        assert!(matches!(validate_conf(&conf), Err(MspErr::Validation(_))));
    }

    #[test]
    fn usernames() {
        assert!(validate_username("Notch").is_ok());
        assert!(validate_username("a_b").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[tokio::test]
    async fn srv_disabled_keeps_target() {
        let mut conf = Conf::create_with_port("mc.example.com", 25570);
        conf.socket_conf.enable_srv = false;

        let target = resolve_target(&conf, SrvProtocol::Tcp).await;

        assert_eq!(target.host, "mc.example.com");
        assert_eq!(target.port, 25570);
        assert_eq!(target.srv_record, None);
    }

    #[tokio::test]
    async fn timeout_wins_race() {
        let result: Result<(), MspErr> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;

            Ok(())
        })
        .await;

        assert!(matches!(result, Err(MspErr::Timeout)));
    }

    #[tokio::test]
    async fn slow_connect_is_a_connect_timeout() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let result: Result<(), MspErr> =
            with_connect_deadline(deadline, std::future::pending()).await;

        assert!(matches!(result, Err(MspErr::ConnectTimeout)));
    }

    #[tokio::test]
    async fn exchange_after_connect_is_a_timeout() {
        let deadline = Instant::now() + Duration::from_millis(50);
        let connected: Result<(), MspErr> = with_connect_deadline(deadline, async { Ok(()) }).await;
        let result: Result<(), MspErr> =
            with_deadline(deadline, std::future::pending()).await;

        assert!(connected.is_ok());
        assert!(matches!(result, Err(MspErr::Timeout)));
    }
}
