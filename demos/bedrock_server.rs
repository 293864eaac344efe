use msp::{Conf, MspErr};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let server = Conf::create_with_port("www.example.com", 19132);
    let info = server.get_bedrock_server_status().await?;

    println!("{}", info);

    Ok(())
}
