/// Msp error uniform error definition.
///
/// Every protocol call either returns a complete result or one of these,
/// there are no partial results.
#[derive(Debug, thiserror::Error)]
pub enum MspErr {
    /// Bad caller arguments, raised before any I/O happens.
    #[error("invalid argument: {0}")]
    Validation(String),
    /// The transport did not connect within the configured timeout.
    #[error("timed out while connecting to the server")]
    ConnectTimeout,
    /// The whole operation did not finish within the configured timeout.
    #[error("timed out while waiting for the server")]
    Timeout,
    /// Peer closed the connection while more data was expected.
    #[error("connection closed unexpectedly while waiting for data")]
    ConnectionClosed,
    /// Server sent a packet ID/type the decoder does not expect next.
    #[error("expected server to send packet type 0x{expected:02X}, received 0x{received:02X}")]
    UnexpectedPacketType { expected: i32, received: i32 },
    /// Echoed session ID does not match what was sent.
    #[error("server session ID mismatch, expected {expected}, received {received}")]
    SessionMismatch { expected: i32, received: i32 },
    /// Echoed ping payload does not match what was sent.
    #[error("ping payload did not match, sent {sent}, received {received}")]
    PayloadMismatch { sent: i64, received: i64 },
    /// Payload present but not parseable into the expected structure.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// VarInts are never longer than 5 bytes.
    #[error("VarInt is too big, VarInts are never longer than 5 bytes")]
    VarIntTooLarge,
    /// Read past the end of a buffer that will not grow any more.
    #[error("buffer underflow, needed {needed} bytes but only {available} available")]
    BufferUnderflow { needed: usize, available: usize },
    /// RCON server answered the login with request ID -1.
    #[error("invalid RCON password")]
    InvalidPassword,
    /// Query handshake returned a non-numeric challenge token.
    #[error("server sent an invalid challenge token: {0:?}")]
    InvalidChallengeToken(String),
    /// Votifier answered with a status we do not know.
    #[error("unknown server response: {0}")]
    UnknownServerResponse(String),
    /// Votifier v2 server refused the vote.
    #[error("server rejected the vote: {cause}: {error}")]
    VoteRejected { cause: String, error: String },
    /// Votifier v1 public key could not be decoded or used.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// Operation issued from a state that does not allow it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// Handling errors that occur during sockets.
    #[error(transparent)]
    IoErr(#[from] std::io::Error),
}

impl From<serde_json::Error> for MspErr {
    fn from(err: serde_json::Error) -> Self {
        MspErr::MalformedResponse(err.to_string())
    }
}

impl From<std::num::ParseIntError> for MspErr {
    fn from(err: std::num::ParseIntError) -> Self {
        MspErr::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MspErr>;
