use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcplet::{DhcpServer, Result, ServerIdentity};

#[derive(Parser)]
#[command(name = "dhcplet")]
#[command(author, version, about = "A minimal single-subnet DHCP server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let identity = ServerIdentity::discover()?;
    let server = DhcpServer::new(identity).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, stopping server");
            Ok(())
        }
    }
}
