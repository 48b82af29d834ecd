//! Lambdock command line.

use clap::{Parser, Subcommand};
use lambdock::commands::{invocation_data, LogsRequest};
use lambdock::container::StartOptions;
use lambdock::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lambdock", version, about = "Run Rust Lambda functions locally behind an API Gateway emulator")]
struct Cli {
    /// Service file describing the functions
    #[arg(short = 'c', long, default_value = "serverless.yml", global = true)]
    config: PathBuf,

    /// Service root; artifacts are resolved against it
    #[arg(long, default_value = ".", global = true)]
    src: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the container status of every function
    Ps,
    /// Start function containers (all when no -f is given)
    Start {
        #[arg(short, long = "function")]
        function: Vec<String>,
    },
    /// Stop function containers (all when no -f is given)
    Stop {
        #[arg(short, long = "function")]
        function: Vec<String>,
    },
    /// Print logs of running function containers
    Logs {
        #[arg(short, long = "function")]
        function: Vec<String>,
        /// Disable colored labels
        #[arg(long)]
        no_color: bool,
        /// Include the containers' stderr
        #[arg(long)]
        all: bool,
        /// Keep following the logs
        #[arg(short, long)]
        watch: bool,
    },
    /// Invoke a function with a JSON event
    Invoke {
        #[arg(short, long)]
        function: String,
        /// JSON file holding the event
        #[arg(short, long)]
        path: Option<PathBuf>,
        /// Event as JSON text; keys override those from --path
        #[arg(short, long)]
        data: Option<String>,
        /// Write the function output to stdout unformatted
        #[arg(long)]
        stdout: bool,
    },
    /// Start functions with http events and serve the API Gateway
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Logs go to stderr; stdout is reserved for `invoke --stdout`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = ServiceConfig::load(&cli.config)?;
    let gateway = Gateway::new(service, &cli.src, Arc::new(SystemRunner))?;

    match cli.command {
        Command::Ps => gateway.ps().await?,
        Command::Start { function } => {
            gateway.start(&function, &StartOptions::default()).await?;
            gateway.ps().await?;
        }
        Command::Stop { function } => {
            gateway.stop(&function).await?;
            gateway.ps().await?;
        }
        Command::Logs {
            function,
            no_color,
            all,
            watch,
        } => {
            let gateway = if no_color { gateway.color(false) } else { gateway };
            gateway.logs(&function, LogsRequest { all, watch }).await?;
        }
        Command::Invoke {
            function,
            path,
            data,
            stdout,
        } => {
            let path = path.map(|p| cli.src.join(p));
            let data = invocation_data(path.as_deref(), data.as_deref())?;
            gateway.invoke(&function, &data, stdout).await?;
        }
        Command::Serve { host, port } => {
            let config = ProxyConfig::new().host(host).port(port);
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Cannot listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            };
            gateway.serve(config, shutdown).await?;
        }
    }

    Ok(())
}
