use msp::{Conf, MspErr, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Conf::create_with_port("www.example.com", 25565);
    let info: Server = server.get_server_status().await?;

    println!("{}", info);

    Ok(())
}
