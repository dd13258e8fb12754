use clap::{Parser, Subcommand};
use scoreboard_client::ScoreboardClient;
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the scoreboard proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache and upstream queue occupancy
    Health,
    /// Check that the proxy accepts traffic
    Ready,
    /// Fetch entry summaries in one batch
    Summary {
        /// Comma-separated entry IDs
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<u64>,
    },
    /// Fetch gameweek points in one batch
    History {
        /// Comma-separated entry IDs
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<u64>,
        /// Gameweek number
        #[arg(long)]
        gw: u32,
    },
    /// GET any path through the proxy, e.g. /api/bootstrap-static/
    Get { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let client = ScoreboardClient::new(&cli.url);

    match cli.command {
        Commands::Health => print_json(&client.health().await?)?,
        Commands::Ready => print_json(&client.ready().await?)?,
        Commands::Summary { ids } => print_json(&client.summary(&ids).await?)?,
        Commands::History { ids, gw } => print_json(&client.history(&ids, gw).await?)?,
        Commands::Get { path } => {
            let path = if path.starts_with('/') { path } else { format!("/{path}") };
            let res = client.get(&path).await?;
            let status = res.status();
            for name in ["x-cache", "x-stale", "x-upstream-status", "cache-control"] {
                if let Some(value) = res.headers().get(name).and_then(|v| v.to_str().ok()) {
                    eprintln!("{name}: {value}");
                }
            }
            if !status.is_success() {
                eprintln!("Error: proxy returned status {}", status);
            }
            let text = res.text().await?;
            match serde_json::from_str::<Value>(&text) {
                Ok(json) => print_json(&json)?,
                Err(_) => println!("{text}"),
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
