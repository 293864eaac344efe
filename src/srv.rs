use serde::Serialize;
use std::net::IpAddr;

/// Host and port a `_minecraft` SRV record pointed to.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub host: String,
    pub port: u16,
}

/// Transport the SRV record is looked up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrvProtocol {
    Tcp,
    Udp,
}

impl SrvProtocol {
    fn as_str(&self) -> &'static str {
        match self {
            SrvProtocol::Tcp => "tcp",
            SrvProtocol::Udp => "udp",
        }
    }
}

/// Look up `_minecraft._<proto>.<host>`.
///
/// Any lookup failure is `None`, the caller then keeps its own host and port.
/// IP literals are never looked up.
pub async fn resolve_srv(host: &str, protocol: SrvProtocol) -> Option<SrvRecord> {
    if host.parse::<IpAddr>().is_ok() || host.eq_ignore_ascii_case("localhost") {
        return None;
    }

    lookup(&format!("_minecraft._{}.{}", protocol.as_str(), host)).await
}

#[cfg(feature = "srv")]
async fn lookup(name: &str) -> Option<SrvRecord> {
    use hickory_resolver::TokioAsyncResolver;

    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(err) => {
            tracing::debug!(%err, "no system resolver, skipping SRV lookup");

            return None;
        }
    };

    match resolver.srv_lookup(name).await {
        Ok(records) => records.iter().next().map(|record| SrvRecord {
            host: record.target().to_utf8().trim_end_matches('.').to_string(),
            port: record.port(),
        }),
        Err(err) => {
            tracing::trace!(name, %err, "SRV lookup failed");

            None
        }
    }
}

#[cfg(not(feature = "srv"))]
async fn lookup(_name: &str) -> Option<SrvRecord> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ip_literals_are_not_looked_up() {
        assert_eq!(resolve_srv("127.0.0.1", SrvProtocol::Tcp).await, None);
        assert_eq!(resolve_srv("::1", SrvProtocol::Udp).await, None);
        assert_eq!(resolve_srv("localhost", SrvProtocol::Tcp).await, None);
    }
}
