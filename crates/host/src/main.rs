use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fsgate_host::api::{self, AppState};
use fsgate_host::auth::{generate_secure_token, resolve_credential, AuthGate};
use fsgate_host::config::{Config, Overrides};
use fsgate_vfs::LocalFs;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Serve a workspace directory over HTTP for remote file management
#[derive(Parser, Debug)]
#[command(name = "fsgate")]
#[command(about = "File management API over a sandboxed workspace directory", long_about = None)]
#[command(version)]
struct Args {
    /// Working directory to expose (created if missing)
    #[arg(short, long, value_name = "DIR")]
    workpath: Option<PathBuf>,

    /// API access password, required as `passwd` on every request
    #[arg(long)]
    passwd: Option<String>,

    /// Read the API password from a file
    #[arg(long, value_name = "PATH")]
    passwd_file: Option<PathBuf>,

    /// Host to bind (default 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (default 5000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to configuration file (default ~/.config/fsgate/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print a freshly generated password and exit
    #[arg(long)]
    gen_passwd: bool,
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
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Graceful shutdown initiated");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging (tracing)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.gen_passwd {
        println!("{}", generate_secure_token());
        return Ok(());
    }

    // === LOAD CONFIGURATION ===
    let mut config = Config::load(args.config.as_deref())?;
    config.apply(Overrides {
        host: args.host,
        port: args.port,
        root: args.workpath,
        passwd_file: args.passwd_file,
    });

    let passwd = resolve_credential(
        args.passwd.as_deref(),
        config.workspace.passwd_file.as_deref(),
    )?;

    let root = config.workspace_root()?;
    let store = LocalFs::new(root)
        .with_context(|| format!("Failed to open workspace {}", root.display()))?;
    let workspace = store.root().to_path_buf();

    let state = AppState::new(Arc::new(store), Arc::new(AuthGate::new(&passwd)));
    let app = api::app(state);

    // === START HTTP SERVER (axum) ===
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "Starting API server");
    tracing::info!(root = %workspace.display(), "Working directory");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("Server stopped");
    Ok(())
}
