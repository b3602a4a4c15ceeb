use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration file with defaults.
    Init {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the dispatch gateway (HTTP control plane + drain loop).
    Serve {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Query a running gateway and print session state and queue length.
    Status {
        /// Config file path (default: COURIER_CONFIG_PATH or ~/.courier/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("courier {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Status { config }) => {
            if let Err(e) = run_status(config).await {
                log::error!("status failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    lib::config::init_config_file(&path)?;
    println!("initialized configuration at {}", path.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, _path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_status(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let url = format!(
        "http://{}:{}/api/status",
        config.gateway.bind.trim(),
        config.gateway.port
    );
    let status: serde_json::Value = reqwest::get(&url).await?.json().await?;
    println!(
        "session: {}",
        status
            .get("sessionState")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    );
    println!(
        "queue:   {} message(s){}",
        status.get("queueLength").and_then(|v| v.as_u64()).unwrap_or(0),
        if status.get("draining").and_then(|v| v.as_bool()).unwrap_or(false) {
            " (draining)"
        } else {
            ""
        }
    );
    if status
        .get("qrPending")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        println!("login:   QR challenge pending (GET /api/qr)");
    }
    Ok(())
}
