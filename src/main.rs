use huddle::config::Config;
use huddle::signaling::SignalingServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("huddle=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    println!("   Huddle Signaling Relay");
    println!("   Binding to {}", config.bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalingServer::bind(&config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Bye");
    Ok(())
}
