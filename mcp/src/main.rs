use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use matomo_mcp_runtime::{MatomoSettings, McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "matomo-mcp",
    version,
    about = "Matomo MCP server — web analytics reporting tools over stdio"
)]
struct Cli {
    /// Matomo base URL (e.g. https://analytics.example.com)
    #[arg(long, env = "MATOMO_URL")]
    url: Option<String>,

    /// Matomo API token (token_auth)
    #[arg(long, env = "MATOMO_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, env = "MATOMO_MCP_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "matomo_mcp=info,matomo_mcp_runtime=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    let settings = MatomoSettings {
        url: cli.url,
        token: cli.token,
    };
    let code = run_mcp(settings, cli.command).await;
    std::process::exit(code);
}
