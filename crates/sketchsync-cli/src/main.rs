use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sketchsync_canvas::{FsSnapshotStore, SnapshotStore};
use sketchsync_core::config::{Config, ServerConfig};
use sketchsync_gateway::{GatewayState, start_gateway};

#[derive(Parser)]
#[command(
    name = "sketchsync",
    about = "Shared whiteboard server: one canvas, many browsers, kept in sync over WebSocket",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the drawing server
    Serve {
        /// Port to listen on (default: 8080)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Persisted canvas snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List persisted snapshots, oldest first
    List,
}

fn init_logging(config: &Config, verbose: bool) {
    let default = if verbose {
        "debug"
    } else {
        config.log_level().unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if config.log_json() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let mut config = Config::load(&config_path)?;

    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Serve { port, bind } => {
            let port = port.unwrap_or_else(|| config.port());
            if let Some(bind) = bind {
                let server = config.server.get_or_insert_with(|| ServerConfig {
                    port,
                    bind: None,
                });
                server.bind = Some(bind);
            }

            let (width, height) = config.canvas_size();
            tracing::info!(
                config = %config_path.display(),
                "Starting SketchSync on port {port} with a {width}x{height} canvas"
            );

            let state = Arc::new(GatewayState::new(Arc::new(config))?);
            start_gateway(state, port).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
        },
        Commands::Snapshots { action } => match action {
            SnapshotAction::List => {
                let store = FsSnapshotStore::new(config.snapshot_dir());
                let snapshots = store.list().await?;
                if snapshots.is_empty() {
                    println!("No snapshots in {}", store.dir().display());
                }
                for snapshot in snapshots {
                    println!("{}\t{} bytes", snapshot.name, snapshot.bytes);
                }
            }
        },
    }

    Ok(())
}
