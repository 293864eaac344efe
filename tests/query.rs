use msp::{Conf, MspErr, QueryOptions};
use std::time::Duration;
use tokio::net::UdpSocket;

const CHALLENGE_TOKEN: i32 = 9513307;

async fn bind() -> (UdpSocket, Conf) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let mut conf = Conf::create_with_port("127.0.0.1", port);

    conf.socket_conf.timeout = Some(Duration::from_secs(2));
    conf.socket_conf.enable_srv = false;

    (socket, conf)
}

/// Answer the handshake with `token` and return the stat request that follows.
async fn serve_handshake(socket: &UdpSocket, token: &str) -> (Vec<u8>, std::net::SocketAddr) {
    let mut buf = [0u8; 64];
    let (size, addr) = socket.recv_from(&mut buf).await.unwrap();

    assert_eq!(size, 7);
    assert_eq!(&buf[..3], &[0xFE, 0xFD, 0x09]);

    let mut reply = vec![0x09];

    reply.extend_from_slice(&buf[3..7]);
    reply.extend_from_slice(token.as_bytes());
    reply.push(0x00);
    socket.send_to(&reply, addr).await.unwrap();

    let (size, addr) = socket.recv_from(&mut buf).await.unwrap();

    (buf[..size].to_vec(), addr)
}

fn full_stat(session_id: &[u8]) -> Vec<u8> {
    let mut bufs = vec![0x00];

    bufs.extend_from_slice(session_id);
    bufs.extend_from_slice(b"splitnum\x00\x80\x00");

    for (key, value) in [
        ("hostname", "A Minecraft Server"),
        ("gametype", "SMP"),
        ("game_id", "MINECRAFT"),
        ("version", "1.20.1"),
        ("plugins", "Paper on 1.20.1: EssentialsX; LuckPerms"),
        ("map", "world"),
        ("numplayers", "2"),
        ("maxplayers", "20"),
        ("hostport", "25565"),
        ("hostip", "127.0.0.1"),
    ] {
        bufs.extend_from_slice(key.as_bytes());
        bufs.push(0x00);
        bufs.extend_from_slice(value.as_bytes());
        bufs.push(0x00);
    }

    bufs.push(0x00);
    bufs.extend_from_slice(b"\x01player_\x00\x00");
    bufs.extend_from_slice(b"Notch\x00jeb_\x00\x00");

    bufs
}

#[tokio::test]
async fn full_query_end_to_end() {
    let (socket, conf) = bind().await;
    let server = tokio::spawn(async move {
        let (request, addr) = serve_handshake(&socket, "9513307").await;

        assert_eq!(request.len(), 15);
        assert_eq!(&request[..3], &[0xFE, 0xFD, 0x00]);
        assert_eq!(&request[3..7], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&request[7..11], &CHALLENGE_TOKEN.to_be_bytes());
        assert_eq!(&request[11..], &[0x00; 4]);

        socket.send_to(&full_stat(&request[3..7]), addr).await.unwrap();
    });

    let status = conf.query_full().await.unwrap();

    server.await.unwrap();

    assert_eq!(status.motd.clean, "A Minecraft Server");
    assert_eq!(status.version, "1.20.1");
    assert_eq!(status.software, "Paper on 1.20.1");
    assert_eq!(status.plugins, vec!["EssentialsX", "LuckPerms"]);
    assert_eq!(status.map, "world");
    assert_eq!(status.game_type, "SMP");
    assert_eq!(status.game_id, "MINECRAFT");
    assert_eq!(status.players.online, 2);
    assert_eq!(status.players.max, 20);
    assert_eq!(status.players.list, vec!["Notch", "jeb_"]);
    assert_eq!(status.host_port, 25565);
    assert_eq!(status.host_ip, "127.0.0.1");
}

#[tokio::test]
async fn basic_query_end_to_end() {
    let (socket, conf) = bind().await;
    let server = tokio::spawn(async move {
        let (request, addr) = serve_handshake(&socket, "9513307").await;

        assert_eq!(request.len(), 11);

        let mut reply = vec![0x00];

        reply.extend_from_slice(&request[3..7]);
        reply.extend_from_slice(b"A Minecraft Server\x00SMP\x00world\x002\x0020\x00");
        reply.extend_from_slice(&25565u16.to_le_bytes());
        reply.extend_from_slice(b"127.0.0.1\x00");
        socket.send_to(&reply, addr).await.unwrap();
    });

    let status = conf.query().await.unwrap();

    server.await.unwrap();

    assert_eq!(status.motd.raw, "A Minecraft Server");
    assert_eq!(status.game_type, "SMP");
    assert_eq!(status.map, "world");
    assert_eq!(status.players.online, 2);
    assert_eq!(status.players.max, 20);
    assert_eq!(status.host_port, 25565);
    assert_eq!(status.host_ip, "127.0.0.1");
}

#[tokio::test]
async fn session_id_is_masked() {
    let (socket, conf) = bind().await;
    let server = tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let (_, addr) = socket.recv_from(&mut buf).await.unwrap();
        let session_id = buf[3..7].to_vec();

        // Reply with a bad token so the exchange ends here.
        let mut reply = vec![0x09];

        reply.extend_from_slice(&session_id);
        reply.extend_from_slice(b"abc\x00");
        socket.send_to(&reply, addr).await.unwrap();

        session_id
    });

    let options = QueryOptions {
        session_id: 0x12345678,
    };
    let result = msp::query_basic_status(&conf, &options).await;

    assert_eq!(server.await.unwrap(), vec![0x02, 0x04, 0x06, 0x08]);
    assert!(matches!(result, Err(MspErr::InvalidChallengeToken(token)) if token == "abc"));
}

#[tokio::test]
async fn large_challenge_token_keeps_low_bits() {
    let (socket, conf) = bind().await;
    let server = tokio::spawn(async move {
        let (request, addr) = serve_handshake(&socket, "4294967297").await;
        let token = request[7..11].to_vec();

        socket.send_to(&full_stat(&request[3..7]), addr).await.unwrap();

        token
    });

    conf.query_full().await.unwrap();

    assert_eq!(server.await.unwrap(), 1i32.to_be_bytes());
}

#[tokio::test]
async fn unanswered_query_times_out() {
    let (socket, mut conf) = bind().await;

    conf.socket_conf.timeout = Some(Duration::from_millis(200));

    let result = conf.query().await;

    assert!(matches!(result, Err(MspErr::Timeout)));
    drop(socket);
}
