use clap::Parser;
use tokio::signal;

use confstore::{config, server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the runtime config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listen address override
    #[arg(long)]
    addr: Option<String>,

    /// Metrics address override
    #[arg(long)]
    metrics_addr: Option<String>,

    /// Storage directory override
    #[arg(long)]
    data_path: Option<String>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init().unwrap_or_default();
    let args = Args::parse();
    config::RuntimeConfig::from_toml(&args.config).expect("Config is missing");
    {
        let mut cfg = config::instance().lock().unwrap();
        if let Some(addr) = args.addr {
            cfg.addr = addr;
        }
        if let Some(metrics_addr) = args.metrics_addr {
            cfg.metrics_addr = metrics_addr;
        }
        if let Some(data_path) = args.data_path {
            cfg.data_path = data_path;
        }
    }
    {
        server::instance().lock().await.start().await;
    }
    shutdown_signal().await;
    {
        server::instance().lock().await.stop();
    }
    Ok(())
}
