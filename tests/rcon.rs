use msp::{socket::StreamSocket, Conf, MspErr, Rcon, RconState};
use std::time::Duration;
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};

struct Packet {
    request_id: i32,
    packet_type: i32,
    body: String,
}

async fn listen() -> (TcpListener, Conf) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut conf = Conf::create_with_port("127.0.0.1", port);

    conf.socket_conf.timeout = Some(Duration::from_secs(2));

    (listener, conf)
}

async fn read_packet(socket: &mut StreamSocket<TcpStream>) -> Packet {
    let length = socket.read_i32_le().await.unwrap();
    let request_id = socket.read_i32_le().await.unwrap();
    let packet_type = socket.read_i32_le().await.unwrap();
    let body = socket.read_bytes(length as usize - 8).await.unwrap();

    assert_eq!(&body[body.len() - 2..], &[0x00, 0x00]);

    Packet {
        request_id,
        packet_type,
        body: String::from_utf8(body[..body.len() - 2].to_vec()).unwrap(),
    }
}

async fn write_packet(
    socket: &mut StreamSocket<TcpStream>,
    request_id: i32,
    packet_type: i32,
    body: &str,
) {
    socket.write_i32_le(10 + body.len() as i32);
    socket.write_i32_le(request_id);
    socket.write_i32_le(packet_type);
    socket.write_string_bytes(body);
    socket.write_bytes(&[0x00, 0x00]);
    socket.flush(false).await.unwrap();
}

/// Accept the login, checking the password.
async fn accept_login(listener: &TcpListener, password: &str) -> StreamSocket<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut socket = StreamSocket::new(stream);
    let login = read_packet(&mut socket).await;

    assert_eq!(login.packet_type, 3);
    assert_eq!(login.body, password);

    write_packet(&mut socket, login.request_id, 2, "").await;

    socket
}

#[tokio::test]
async fn wrong_password_closes_session() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut socket = StreamSocket::new(&mut stream);

        socket.read_i32_le().await.unwrap();
        socket.read_i32_le().await.unwrap();
        socket.read_i32_le().await.unwrap();
        socket.read_bytes(b"wrong\x00\x00".len()).await.unwrap();

        let mut reply = Vec::new();

        reply.extend_from_slice(&10i32.to_le_bytes());
        reply.extend_from_slice(&(-1i32).to_le_bytes());
        reply.extend_from_slice(&2i32.to_le_bytes());
        reply.extend_from_slice(&[0x00, 0x00]);
        socket.write_bytes(&reply);
        socket.flush(false).await.unwrap();
        drop(socket);

        // Client must hang up.
        let mut rest = Vec::new();

        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap()
    });

    let mut rcon = Rcon::new();

    rcon.connect(&conf).await.unwrap();
    assert_eq!(rcon.state(), RconState::Connected);

    assert!(matches!(
        rcon.login("wrong").await,
        Err(MspErr::InvalidPassword)
    ));
    assert_eq!(rcon.state(), RconState::Closed);
    assert!(!rcon.is_connected());
    assert_eq!(server.await.unwrap(), 0);
}

#[tokio::test]
async fn replies_are_matched_by_request_id() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept_login(&listener, "secret").await;
        let first = read_packet(&mut socket).await;
        let second = read_packet(&mut socket).await;

        assert_eq!(first.packet_type, 2);
        assert_eq!(first.body, "list");
        assert_eq!(second.body, "seed");

        // Answer out of order.
        write_packet(&mut socket, second.request_id, 0, "Seed: [42]").await;
        write_packet(
            &mut socket,
            first.request_id,
            0,
            "There are 0 of a max of 20 players online",
        )
        .await;

        let third = read_packet(&mut socket).await;

        write_packet(&mut socket, third.request_id, 0, "Saved the game").await;
        socket
    });

    let mut rcon = Rcon::new();

    rcon.connect(&conf).await.unwrap();
    rcon.login("secret").await.unwrap();
    assert!(rcon.is_logged_in());

    let list = rcon.run("list").await.unwrap();
    let seed = rcon.run("seed").await.unwrap();

    assert_ne!(list, seed);
    assert_eq!(
        rcon.response(list).await.unwrap(),
        "There are 0 of a max of 20 players online"
    );
    assert_eq!(rcon.response(seed).await.unwrap(), "Seed: [42]");
    assert_eq!(rcon.execute("save-all").await.unwrap(), "Saved the game");

    let _socket = server.await.unwrap();

    rcon.close().await;
    assert_eq!(rcon.state(), RconState::Closed);
    assert!(matches!(rcon.run("list").await, Err(MspErr::InvalidState(_))));
}

#[tokio::test]
async fn messages_arrive_in_order() {
    let (listener, conf) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept_login(&listener, "secret").await;
        let command = read_packet(&mut socket).await;

        write_packet(&mut socket, command.request_id, 0, "first").await;
        write_packet(&mut socket, command.request_id, 0, "second").await;
        socket
    });

    let mut rcon = Rcon::new();

    rcon.connect(&conf).await.unwrap();
    rcon.login("secret").await.unwrap();

    let request_id = rcon.run("help").await.unwrap();
    let first = rcon.next_message().await.unwrap();
    let second = rcon.next_message().await.unwrap();

    assert_eq!(first.request_id, request_id);
    assert_eq!(first.message, "first");
    assert_eq!(second.message, "second");

    drop(server.await.unwrap());

    assert!(matches!(
        rcon.next_message().await,
        Err(MspErr::ConnectionClosed)
    ));
}

#[tokio::test]
async fn connect_refused() {
    let (listener, conf) = listen().await;

    drop(listener);

    let mut rcon = Rcon::new();

    assert!(rcon.connect(&conf).await.is_err());
    assert_eq!(rcon.state(), RconState::Closed);
    assert!(matches!(
        rcon.connect(&conf).await,
        Err(MspErr::InvalidState(_))
    ));
}
