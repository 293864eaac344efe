use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use msp::{socket::StreamSocket, Conf, LegacyVoteOptions, MspErr, VoteOptions};
use rsa::{
    pkcs8::{EncodePublicKey, LineEnding},
    Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey,
};
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

const TOKEN: &str = "k8dn5tqnrmhagrbnd2k0qbd6h3";

async fn listen() -> (TcpListener, Conf) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut conf = Conf::create_with_port("127.0.0.1", port);

    conf.socket_conf.timeout = Some(Duration::from_secs(5));

    (listener, conf)
}

/// Send the v2 handshake, then return the decoded vote message.
async fn read_v2_vote(socket: &mut StreamSocket<TcpStream>) -> Value {
    socket.write_string_bytes("VOTIFIER 2 a1b2c3\n");
    socket.flush(false).await.unwrap();

    assert_eq!(socket.read_u16_be().await.unwrap(), 0x733A);

    let length = socket.read_u16_be().await.unwrap();

    serde_json::from_str(&socket.read_string(length as usize).await.unwrap()).unwrap()
}

fn verify_signature(message: &Value) -> Value {
    let payload = message["payload"].as_str().unwrap();
    let signature = STANDARD
        .decode(message["signature"].as_str().unwrap())
        .unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(TOKEN.as_bytes()).unwrap();

    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).unwrap();

    serde_json::from_str(payload).unwrap()
}

#[tokio::test]
async fn v2_vote_accepted() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = StreamSocket::new(stream);
        let message = read_v2_vote(&mut socket).await;

        socket.write_string_bytes("{\"status\":\"ok\"}\r\n");
        socket.flush(false).await.unwrap();

        verify_signature(&message)
    });

    let mut options = VoteOptions::new("msp", "Notch", TOKEN);

    options.timestamp = Some(1_700_000_000_000);
    options.uuid = Some("069a79f4-44e9-4726-a5be-fca90e38aaf5".into());

    conf.send_vote(&options).await.unwrap();

    let payload = server.await.unwrap();

    assert_eq!(payload["serviceName"], "msp");
    assert_eq!(payload["username"], "Notch");
    assert_eq!(payload["address"], "127.0.0.1");
    assert_eq!(payload["timestamp"], 1_700_000_000_000u64);
    assert_eq!(payload["challenge"], "a1b2c3");
    assert_eq!(payload["uuid"], "069a79f4-44e9-4726-a5be-fca90e38aaf5");
}

#[tokio::test]
async fn v2_vote_rejected() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = StreamSocket::new(stream);

        read_v2_vote(&mut socket).await;

        socket.write_string_bytes(
            "{\"status\":\"error\",\"cause\":\"CorruptedFrameException\",\"error\":\"Signature is not valid (invalid token?)\"}\r\n",
        );
        socket.flush(false).await.unwrap();
    });

    let result = conf
        .send_vote(&VoteOptions::new("msp", "Notch", "wrong token"))
        .await;

    server.await.unwrap();

    assert!(matches!(
        result,
        Err(MspErr::VoteRejected { cause, error })
            if cause == "CorruptedFrameException" && error.starts_with("Signature is not valid")
    ));
}

#[tokio::test]
async fn v2_vote_needs_v2_server() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = StreamSocket::new(stream);

        socket.write_string_bytes("VOTIFIER 1.9\n");
        socket.flush(false).await.unwrap();
        socket
    });

    let result = conf
        .send_vote(&VoteOptions::new("msp", "Notch", TOKEN))
        .await;
    let _socket = server.await.unwrap();

    assert!(matches!(result, Err(MspErr::UnknownServerResponse(_))));
}

#[tokio::test]
async fn oversized_v2_vote_is_not_sent() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = StreamSocket::new(stream);

        socket.write_string_bytes("VOTIFIER 2 a1b2c3\n");
        socket.flush(false).await.unwrap();

        // Nothing may follow the handshake.
        socket.read_u8().await.is_err()
    });

    let service_name = "s".repeat(70_000);
    let result = conf
        .send_vote(&VoteOptions::new(&service_name, "Notch", TOKEN))
        .await;

    assert!(matches!(result, Err(MspErr::Validation(_))));
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn vote_validation() {
    let conf = Conf::create_with_port("127.0.0.1", 8192);

    assert!(matches!(
        conf.send_vote(&VoteOptions::new("", "Notch", TOKEN)).await,
        Err(MspErr::Validation(_))
    ));
    assert!(matches!(
        conf.send_vote(&VoteOptions::new("msp", "a name that is far too long", TOKEN))
            .await,
        Err(MspErr::Validation(_))
    ));
    assert!(matches!(
        conf.send_legacy_vote(&LegacyVoteOptions::new("msp", "Notch", "")).await,
        Err(MspErr::Validation(_))
    ));
}

/// Serve a v1 handshake and return the encrypted vote block.
async fn serve_v1(listener: TcpListener) -> Vec<u8> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = StreamSocket::new(stream);

    socket.write_string_bytes("VOTIFIER 1.9\n");
    socket.flush(false).await.unwrap();

    socket.read_bytes(128).await.unwrap()
}

fn legacy_vote(conf: &Conf, public_key: &str) -> LegacyVoteOptions {
    let mut options = LegacyVoteOptions::new("msp", "Notch", public_key);

    options.timestamp = Some(1_700_000_000_000);
    options.address = Some(conf.host.clone());

    options
}

#[tokio::test]
async fn v1_vote_with_der_key() {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let public_key = RsaPublicKey::from(&private_key);
    let encoded = STANDARD.encode(public_key.to_public_key_der().unwrap().as_bytes());
    let (listener, conf) = listen().await;
    let server = tokio::spawn(serve_v1(listener));

    conf.send_legacy_vote(&legacy_vote(&conf, &encoded))
        .await
        .unwrap();

    let block = private_key
        .decrypt(Pkcs1v15Encrypt, &server.await.unwrap())
        .unwrap();

    assert_eq!(
        String::from_utf8(block).unwrap(),
        "VOTE\nmsp\nNotch\n127.0.0.1\n1700000000000\n"
    );
}

#[tokio::test]
async fn v1_vote_with_pem_key_and_default_address() {
    let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
    let pem = RsaPublicKey::from(&private_key)
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    let (listener, conf) = listen().await;
    let server = tokio::spawn(serve_v1(listener));
    let mut options = LegacyVoteOptions::new("msp", "Notch", &pem);

    options.timestamp = Some(1);

    conf.send_legacy_vote(&options).await.unwrap();

    let block = private_key
        .decrypt(Pkcs1v15Encrypt, &server.await.unwrap())
        .unwrap();

    assert_eq!(
        String::from_utf8(block).unwrap(),
        format!("VOTE\nmsp\nNotch\n127.0.0.1:{}\n1\n", conf.port)
    );
}
