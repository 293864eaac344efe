use msp::{Conf, MspErr, VoteOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let token = std::env::var("VOTIFIER_TOKEN").unwrap_or_default();
    let server = Conf::create_with_port("localhost", 8192);

    server
        .send_vote(&VoteOptions::new("msp", "Notch", &token))
        .await?;

    println!("vote accepted");

    Ok(())
}
