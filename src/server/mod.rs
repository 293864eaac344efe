mod bedrock_server;
mod legacy_server;
mod netty_server;
mod regular_server;

pub use bedrock_server::*;
pub use legacy_server::{
    get_beta_legacy_server_status, get_legacy_server_status, get_legacy_status, LegacyBetaServer,
    LegacyPlayers, LegacyServer, LegacyStatus, LegacyVersion,
};
pub use netty_server::*;
pub use regular_server::*;
