use msp::{Conf, MspErr, Rcon};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let password = std::env::var("RCON_PASSWORD").unwrap_or_default();
    let mut rcon = Rcon::new();

    rcon.connect(&Conf::create_with_port("localhost", 25575)).await?;
    rcon.login(&password).await?;

    println!("{}", rcon.execute("list").await?);

    rcon.close().await;

    Ok(())
}
