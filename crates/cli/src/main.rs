use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gemrelay")]
#[command(about = "Telegram to Gemini multimodal relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay (Telegram channel, Gemini client, liveness endpoint). This is the default when no subcommand is given.
    Run {
        /// Config file path (default: GEMRELAY_CONFIG_PATH or ~/.gemrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port for the liveness endpoint and webhook (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let (config, port) = match cli.command {
        Some(Commands::Version) => {
            println!("gemrelay {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Some(Commands::Run { config, port }) => (config, port),
        None => (None, None),
    };

    if let Err(e) = run(config, port).await {
        log::error!("relay failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    // Both credentials are required before anything is started.
    let credentials = lib::config::resolve_credentials(&config)?;
    log::info!(
        "starting relay on {}:{} (config {}, model {})",
        config.gateway.bind,
        config.gateway.port,
        path.display(),
        config.gemini.model
    );
    lib::gateway::run_gateway(config, credentials).await
}
