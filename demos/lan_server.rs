use msp::{scan_lan, LanOptions, MspErr};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), MspErr> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let servers = scan_lan(&LanOptions {
        scan_time: Duration::from_secs(3),
    })
    .await?;

    for server in servers {
        println!("{}", server);
    }

    Ok(())
}
