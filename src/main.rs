use clap::Parser;
use sociallink::{Config, Server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sociallink", about = "Social account connection hub", version)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::load()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
