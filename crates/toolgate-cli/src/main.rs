use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use toolgate_client::ClientConfig;

mod call_cmd;
mod list_cmd;

#[derive(Parser)]
#[command(name = "toolgate", about = "Toolgate CLI - consume and publish agent tools")]
struct Cli {
    /// Tool server URL (a trailing `/sse` is accepted)
    #[arg(long, env = "TOOLGATE_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "TOOLGATE_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tools a server publishes, with their parameters
    ListTools,

    /// Invoke a remote tool and print its result
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Name of the toolset the remote tools are registered under
        #[arg(long, default_value = "remote")]
        toolset: String,
    },

    /// Publish the demo toolset (add, multiply, echo)
    Serve {
        #[arg(long, env = "TOOLGATE_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "TOOLGATE_PORT", default_value_t = 8000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config =
        ClientConfig::new(cli.url).with_request_timeout(Duration::from_secs(cli.timeout_secs));

    match cli.command {
        Commands::ListTools => list_cmd::run(config).await?,
        Commands::Call {
            tool,
            args,
            toolset,
        } => call_cmd::run(config, &toolset, &tool, &args).await?,
        Commands::Serve { host, port } => {
            toolgate_server::publish(toolgate_server::demo::demo_toolset(), &host, port).await?;
        }
    }

    Ok(())
}
