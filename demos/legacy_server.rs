use msp::{Conf, MspErr};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Conf::create_with_port("www.example.com", 25565);

    // 1.6 servers answer FE01FA, older ones fall back to whichever format they speak.
    match server.get_netty_server_status().await {
        Ok(info) => println!("{}", info),
        Err(_) => println!("{}", server.get_legacy_status().await?),
    }

    Ok(())
}
