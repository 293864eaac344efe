//! Async client for the small protocols Minecraft servers speak: server list ping
//! (modern, legacy and Bedrock), query, RCON, Votifier and LAN discovery.
//!
//! ```no_run
//! use msp::{Conf, MspErr};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MspErr> {
//!     let server = Conf::create("www.example.com");
//!
//!     println!("{}", server.get_server_status().await?);
//!
//!     Ok(())
//! }
//! ```

mod conf;
mod error;
mod lan;
mod query;
mod rcon;
mod server;
mod share;
mod srv;
mod vote;

pub mod cursor;
pub mod motd;
pub mod socket;
pub mod varint;

pub use conf::{
    BedrockOptions, Conf, LanOptions, LegacyVoteOptions, QueryOptions, SocketConf, StatusOptions,
    VoteOptions,
};
pub use error::{MspErr, Result};
pub use lan::{scan_lan, LanServer};
pub use motd::{format_chat_markup, Motd};
pub use query::{
    query_basic_status, query_full_status, split_plugins, QueryBasic, QueryFull,
    QueryFullPlayers, QueryPlayers,
};
pub use rcon::{Message, Rcon, RconState, MAXIMUM_BACKLOG};
pub use server::*;
pub use srv::{resolve_srv, SrvProtocol, SrvRecord};
pub use vote::{send_legacy_vote, send_vote};
