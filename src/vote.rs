use crate::{
    conf::{Conf, LegacyVoteOptions, VoteOptions},
    share::{
        create_tcp_socket, get_server_current_time, validate_conf, validate_not_empty,
        validate_username, with_deadline,
    },
    socket::{Inbound, StreamSocket},
    MspErr,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rsa::{pkcs8::DecodePublicKey, Pkcs1v15Encrypt, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Marks a v2 vote message.
const V2_MAGIC: u16 = 0x733A;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VotePayload<'a> {
    service_name: &'a str,
    username: &'a str,
    address: &'a str,
    timestamp: u64,
    challenge: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
}

#[derive(Serialize)]
struct VoteMessage<'a> {
    payload: &'a str,
    signature: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct VoteResponse {
    status: String,
    cause: String,
    error: String,
}

/// `VOTIFIER <version> [challenge]` sent right after connecting.
struct Handshake {
    version: String,
    challenge: Option<String>,
}

async fn read_handshake<T: Inbound>(socket: &mut StreamSocket<T>) -> Result<Handshake, MspErr> {
    let line = socket.read_string_until(b'\n').await?;
    let mut parts = line.split_whitespace();

    if parts.next() != Some("VOTIFIER") {
        return Err(MspErr::UnknownServerResponse(format!(
            "expected VOTIFIER in handshake, received: {:?}",
            line
        )));
    }

    Ok(Handshake {
        version: parts.next().unwrap_or_default().into(),
        challenge: parts.next().map(String::from),
    })
}

/// Read a response line ended by `\n` or NUL.
async fn read_response_line<T: Inbound>(socket: &mut StreamSocket<T>) -> Result<String, MspErr> {
    socket
        .read_with(|cursor| {
            let bufs = cursor.as_slice();
            let available = bufs.len();

            match bufs.iter().position(|&b| b == b'\n' || b == 0x00) {
                Some(idx) => {
                    let line = String::from_utf8_lossy(&bufs[..idx]).into_owned();

                    cursor.skip(idx + 1)?;

                    Ok(line)
                }
                None => Err(MspErr::BufferUnderflow {
                    needed: available + 1,
                    available,
                }),
            }
        })
        .await
}

fn sign(token: &str, payload: &str) -> Result<String, MspErr> {
    let mut mac = HmacSha256::new_from_slice(token.as_bytes())
        .map_err(|err| MspErr::Validation(format!("invalid token: {}", err)))?;

    mac.update(payload.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn check_response(line: &str) -> Result<(), MspErr> {
    let response = serde_json::from_str::<VoteResponse>(line.trim())?;

    match response.status.as_str() {
        "ok" => Ok(()),
        "error" => Err(MspErr::VoteRejected {
            cause: response.cause,
            error: response.error,
        }),
        _ => Err(MspErr::UnknownServerResponse(line.trim().into())),
    }
}

/// Send a [Votifier v2](https://github.com/NuVotifier/NuVotifier/wiki/Technical-QA#protocol-v2) vote.
///
/// The payload is signed with HMAC-SHA256 keyed by the shared token.
pub async fn send_vote(conf: &Conf, options: &VoteOptions) -> Result<(), MspErr> {
    validate_conf(conf)?;
    validate_not_empty("service name", &options.service_name)?;
    validate_username(&options.username)?;
    validate_not_empty("token", &options.token)?;

    let deadline = tokio::time::Instant::now() + conf.vote_timeout();
    let mut socket = create_tcp_socket(&conf.host, conf.port, deadline).await?;

    with_deadline(deadline, async move {
        let handshake = read_handshake(&mut socket).await?;

        if handshake.version != "2" {
            return Err(MspErr::UnknownServerResponse(format!(
                "unsupported Votifier version: {}",
                handshake.version
            )));
        }

        let Some(challenge) = handshake.challenge else {
            return Err(MspErr::UnknownServerResponse(
                "Votifier v2 handshake without challenge".into(),
            ));
        };
        let payload = serde_json::to_string(&VotePayload {
            service_name: &options.service_name,
            username: &options.username,
            address: options.address.as_deref().unwrap_or(&conf.host),
            timestamp: options.timestamp.unwrap_or_else(get_server_current_time),
            challenge: &challenge,
            uuid: options.uuid.as_deref().filter(|uuid| !uuid.is_empty()),
        })?;
        let signature = sign(&options.token, &payload)?;
        let message = serde_json::to_string(&VoteMessage {
            payload: &payload,
            signature: &signature,
        })?;

        let Ok(length) = u16::try_from(message.len()) else {
            return Err(MspErr::Validation(format!(
                "vote message is {} bytes, at most {} fit the length prefix",
                message.len(),
                u16::MAX
            )));
        };

        socket.write_u16_be(V2_MAGIC);
        socket.write_u16_be(length);
        socket.write_string_bytes(&message);
        socket.flush(false).await?;

        let line = read_response_line(&mut socket).await?;

        socket.close().await;
        debug!(host = %conf.host, port = conf.port, username = %options.username, "vote response received");

        check_response(&line)
    })
    .await
}

/// Accepts the base64 DER key from `public.key` or a PEM block.
fn parse_public_key(key: &str) -> Result<RsaPublicKey, MspErr> {
    let key = key.trim();

    if key.starts_with("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(key)
            .map_err(|err| MspErr::InvalidPublicKey(err.to_string()));
    }

    // Keys pasted through URLs or forms turn `+` into spaces.
    let encoded = key
        .replace(' ', "+")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    let der = STANDARD
        .decode(encoded)
        .map_err(|err| MspErr::InvalidPublicKey(err.to_string()))?;

    RsaPublicKey::from_public_key_der(&der).map_err(|err| MspErr::InvalidPublicKey(err.to_string()))
}

/// Send a [Votifier v1](https://github.com/NuVotifier/NuVotifier/wiki/Technical-QA#protocol-v1) vote.
///
/// The vote block is RSA encrypted with PKCS#1 v1.5 padding, the server sends no reply.
pub async fn send_legacy_vote(conf: &Conf, options: &LegacyVoteOptions) -> Result<(), MspErr> {
    validate_conf(conf)?;
    validate_not_empty("service name", &options.service_name)?;
    validate_username(&options.username)?;
    validate_not_empty("public key", &options.public_key)?;

    let public_key = parse_public_key(&options.public_key)?;
    let deadline = tokio::time::Instant::now() + conf.vote_timeout();
    let mut socket = create_tcp_socket(&conf.host, conf.port, deadline).await?;

    with_deadline(deadline, async move {

        read_handshake(&mut socket).await?;

        let address = match &options.address {
            Some(address) => address.clone(),
            None => format!("{}:{}", conf.host, conf.port),
        };
        let vote = format!(
            "VOTE\n{}\n{}\n{}\n{}\n",
            options.service_name,
            options.username,
            address,
            options.timestamp.unwrap_or_else(get_server_current_time)
        );
        let encrypted = public_key
            .encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, vote.as_bytes())
            .map_err(|err| MspErr::InvalidPublicKey(err.to_string()))?;

        socket.write_bytes(&encrypted);
        socket.flush(false).await?;
        socket.close().await;
        debug!(host = %conf.host, port = conf.port, username = %options.username, "legacy vote sent");

        Ok(())
    })
    .await
}
