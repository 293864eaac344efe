use crate::{
    query, server, share, vote, BedrockServer, LegacyBetaServer, LegacyServer, LegacyStatus,
    MspErr, NettyServer, QueryBasic, QueryFull, Server,
};
use std::{net::Ipv4Addr, time::Duration};

/// Main struct used for configuring the connection.
///
/// By default, the port number for Java Edition is 25565,
/// and for Bedrock Edition (including Pocket Edition), it is 19132.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conf {
    /// Server IP address or a domain name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// See [SocketConf].
    pub socket_conf: SocketConf,
}

/// Additional socket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConf {
    /// Budget for the whole call, connect included.
    /// `None` uses 5 seconds, or 15 seconds for votes.
    pub timeout: Option<Duration>,
    /// Look up `_minecraft._tcp`/`_minecraft._udp` SRV records before connecting.
    /// The default value is `true`.
    pub enable_srv: bool,
    /// Specify the address for creating a UDP connection.
    /// The default value is [Ipv4Addr::UNSPECIFIED].
    pub rep_udp_ipv4: Ipv4Addr,
    /// Specify the port for creating a UDP connection.
    /// The default value is 0, an ephemeral port.
    pub rep_udp_port: u16,
}

impl Default for SocketConf {
    fn default() -> Self {
        Self {
            timeout: None,
            enable_srv: true,
            rep_udp_ipv4: Ipv4Addr::UNSPECIFIED,
            rep_udp_port: 0,
        }
    }
}

/// Options of the modern status ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOptions {
    /// Protocol version sent in the handshake.
    /// See [protocol version numbers](https://wiki.vg/Protocol_version_numbers).
    pub protocol_version: i32,
}

impl Default for StatusOptions {
    fn default() -> Self {
        Self {
            protocol_version: 47,
        }
    }
}

/// Options of the query protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Only the low nibble of every byte is sent.
    pub session_id: i32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { session_id: 1 }
    }
}

/// Options of the Bedrock unconnected ping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BedrockOptions {
    /// Client GUID bytes to send, random when `None`.
    pub client_guid: Option<u32>,
}

/// Votifier v2 vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOptions {
    pub service_name: String,
    pub username: String,
    /// Voter address, the server host when `None`.
    pub address: Option<String>,
    pub uuid: Option<String>,
    /// Milliseconds since the Unix epoch, now when `None`.
    pub timestamp: Option<u64>,
    /// Token the server shares with the service.
    pub token: String,
}

impl VoteOptions {
    pub fn new(service_name: &str, username: &str, token: &str) -> Self {
        Self {
            service_name: service_name.into(),
            username: username.into(),
            address: None,
            uuid: None,
            timestamp: None,
            token: token.into(),
        }
    }
}

/// Votifier v1 vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyVoteOptions {
    pub service_name: String,
    pub username: String,
    /// Voter address, `host:port` when `None`.
    pub address: Option<String>,
    /// Milliseconds since the Unix epoch, now when `None`.
    pub timestamp: Option<u64>,
    /// Content of the server's `public.key`, or a PEM block.
    pub public_key: String,
}

impl LegacyVoteOptions {
    pub fn new(service_name: &str, username: &str, public_key: &str) -> Self {
        Self {
            service_name: service_name.into(),
            username: username.into(),
            address: None,
            timestamp: None,
            public_key: public_key.into(),
        }
    }
}

/// Options of the LAN scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanOptions {
    /// How long to listen for broadcasts.
    pub scan_time: Duration,
}

impl Default for LanOptions {
    fn default() -> Self {
        Self {
            scan_time: Duration::from_secs(5),
        }
    }
}

impl Conf {
    /// Create a connection configuration using the default port.
    ///
    /// Default port is based on Java Edition(25565), to create a default port based on
    /// Bedrock Edition(19132), use [Conf::create_with_port] to manually specify it.
    ///
    /// # Examples
    ///
    /// ```
    /// # use msp::{Conf, SocketConf};
    /// #
    /// let conf = Conf::create("www.example.com");
    /// #
    /// # assert_eq!(conf.host, "www.example.com");
    /// # assert_eq!(conf.port, 25565);
    /// # assert_eq!(conf.socket_conf, SocketConf::default());
    /// ```
    pub fn create(host: &str) -> Self {
        Self::create_with_port(host, 25565)
    }

    /// Create a connection configuration using the specified port.
    ///
    /// # Example
    ///
    /// ```
    /// # use msp::{Conf};
    /// #
    /// let conf = Conf::create_with_port("www.example.com", 19132);
    /// #
    /// # assert_eq!(conf.port, 19132);
    /// ```
    pub fn create_with_port(host: &str, port: u16) -> Self {
        Self {
            host: host.trim().into(),
            port,
            socket_conf: SocketConf::default(),
        }
    }

    /// Create a connection configuration by using a string.
    ///
    /// The string is split at its last `:`, with the first part being the host of
    /// the server and the second part being the port of the server. IPv6 hosts
    /// are written in brackets. If the port cannot be converted to [u16],
    /// it will return a [MspErr::Validation] error.
    ///
    /// # Example
    ///
    /// ```
    /// # use msp::{Conf, MspErr};
    /// #
    /// # fn main() -> Result<(), MspErr> {
    ///     let conf = Conf::create_from_str("www.example.com:25565")?;
    /// #
    /// #   assert_eq!(conf.host, "www.example.com");
    /// #   assert_eq!(conf.port, 25565);
    /// #
    /// #   let conf = Conf::create_from_str("[::1]:25566")?;
    /// #   assert_eq!(conf.host, "::1");
    /// #   let conf = Conf::create_from_str("25565");
    /// #   assert!(conf.is_err());
    /// #   let conf = Conf::create_from_str("www.example.com:-1");
    /// #   assert!(conf.is_err());
    /// #   Ok(())
    /// # }
    /// ```
    pub fn create_from_str(addr: &str) -> Result<Self, MspErr> {
        let Some((host, port)) = addr.trim().rsplit_once(':') else {
            return Err(MspErr::Validation(format!(
                "Invalid socket address syntax: {}",
                addr
            )));
        };
        let host = host.trim().trim_start_matches('[').trim_end_matches(']');

        if host.is_empty() {
            return Err(MspErr::Validation(format!("Missing host: {}", addr)));
        }

        match port.trim().parse::<u16>() {
            Ok(port) => Ok(Self::create_with_port(host, port)),
            Err(_) => Err(MspErr::Validation(format!("Invalid port: {}", port))),
        }
    }

    /// Timeout of status, query and RCON calls.
    pub fn timeout(&self) -> Duration {
        self.socket_conf.timeout.unwrap_or(share::DEFAULT_TIMEOUT)
    }

    /// Timeout of vote calls.
    pub fn vote_timeout(&self) -> Duration {
        self.socket_conf.timeout.unwrap_or(share::DEFAULT_VOTE_TIMEOUT)
    }

    /// Get info from a modern Java Edition server.
    ///
    /// Using the [Server List Ping](https://wiki.vg/Server_List_Ping#Current_.281.7.2B.29) protocol.
    /// Suitable for Java Edition servers version 1.7 and above. Return type is [Server].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use msp::{Conf, MspErr};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), MspErr> {
    ///     let server = Conf::create("www.example.com");
    ///     let info = server.get_server_status().await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn get_server_status(&self) -> Result<Server, MspErr> {
        server::get_server_status(self, &StatusOptions::default()).await
    }

    /// Get info from any pre-Netty Java Edition server, whichever response format it uses.
    ///
    /// Return type is [LegacyStatus], its `version` is `None` for beta servers.
    pub async fn get_legacy_status(&self) -> Result<LegacyStatus, MspErr> {
        server::get_legacy_status(self).await
    }

    /// Get info from a legacy Java Edition server.
    ///
    /// This uses a protocol which is compatible with the
    /// client-server protocol as it was before the Netty rewrite.
    /// Suitable for Java Edition servers version 1.6 and above. Return type is [NettyServer].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use msp::{Conf, MspErr};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), MspErr> {
    ///     let server = Conf::create("www.example.com");
    ///     let info = server.get_netty_server_status().await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn get_netty_server_status(&self) -> Result<NettyServer, MspErr> {
        server::get_netty_server_status(self).await
    }

    /// Get info from a legacy Java Edition server.
    ///
    /// Suitable for Java Edition servers version 1.4 to 1.5. Return type is [LegacyServer].
    pub async fn get_legacy_server_status(&self) -> Result<LegacyServer, MspErr> {
        server::get_legacy_server_status(self).await
    }

    /// Get info from a beta legacy Java Edition server in beta release.
    ///
    /// Suitable for Java Edition servers version beta 1.8 to 1.3.
    /// Return type is [LegacyBetaServer].
    pub async fn get_beta_legacy_server_status(&self) -> Result<LegacyBetaServer, MspErr> {
        server::get_beta_legacy_server_status(self).await
    }

    /// Get **basic** info from a modern Java Edition server using the [Query](https://wiki.vg/Query) protocol.
    ///
    /// To use this protocol, you need to enable the enable-query option on the server side.
    /// See [Server Config](https://wiki.vg/Query#Server_Config). Return type is [QueryBasic].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use msp::{Conf, MspErr};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), MspErr> {
    ///     let server = Conf::create_with_port("www.example.com", 25565);
    ///     let info = server.query().await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn query(&self) -> Result<QueryBasic, MspErr> {
        query::query_basic_status(self, &QueryOptions::default()).await
    }

    /// Get **full** info from a modern Java Edition server using the [Query](https://wiki.vg/Query) protocol.
    ///
    /// To use this protocol, you need to enable the enable-query option on the server side.
    /// See [Server Config](https://wiki.vg/Query#Server_Config). Return type is [QueryFull].
    pub async fn query_full(&self) -> Result<QueryFull, MspErr> {
        query::query_full_status(self, &QueryOptions::default()).await
    }

    /// Get info from a modern Bedrock Edition servers using the [RakNet](https://wiki.vg/Raknet_Protocol) protocol
    ///
    /// Suitable for Bedrock Edition servers version 1.16.220(protocol 431) and above.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use msp::{Conf, MspErr};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), MspErr> {
    ///     let server = Conf::create_with_port("www.example.com", 19132);
    ///     let info = server.get_bedrock_server_status().await?;
    ///
    ///     Ok(())
    /// }
    /// ```
    pub async fn get_bedrock_server_status(&self) -> Result<BedrockServer, MspErr> {
        server::get_bedrock_server_status(self, &BedrockOptions::default()).await
    }

    /// Send a vote to a [NuVotifier](https://github.com/NuVotifier/NuVotifier) v2 listener.
    pub async fn send_vote(&self, options: &VoteOptions) -> Result<(), MspErr> {
        vote::send_vote(self, options).await
    }

    /// Send a vote to a Votifier v1 listener.
    pub async fn send_legacy_vote(&self, options: &LegacyVoteOptions) -> Result<(), MspErr> {
        vote::send_legacy_vote(self, options).await
    }
}

impl std::fmt::Display for Conf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
