//! Weft server - main entry point
//!
//! Exit codes: 0 normal shutdown, 1 config load failure, 2 build failure,
//! 3 start failure.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tower_http::trace::TraceLayer;

use weft_config::{load_file, merge_application, LoadedConfig, WorkflowConfig};
use weft_server::{routes, ServerState};

#[derive(Parser, Debug)]
#[command(name = "weft-server", about = "Configuration-driven workflow engine")]
struct Cli {
    /// Workflow or application config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Management API listen address
    #[arg(long, default_value = "127.0.0.1:8081")]
    admin_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> ExitCode {
    weft_common::init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load the config, if one was given; otherwise start idle and wait for
    // the management API to supply one.
    let config = match &cli.config {
        None => WorkflowConfig::default(),
        Some(path) => match load_file(path) {
            Ok(LoadedConfig::Workflow(config)) => config,
            Ok(LoadedConfig::Application { config, config_dir }) => {
                match merge_application(&config, &config_dir) {
                    Ok(config) => config,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to merge application config");
                        return ExitCode::from(1);
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to load config");
                return ExitCode::from(1);
            }
        },
    };

    let state = ServerState::with_defaults();
    state.set_config(config.clone()).await;

    if cli.config.is_some() {
        let builder = weft_engine::EngineBuilder::new()
            .with_default_handlers()
            .with_default_triggers();
        let engine = match builder.build_from_config(config).await {
            Ok(engine) => engine,
            Err(err) => {
                tracing::error!(error = %err, "engine build failed");
                return ExitCode::from(2);
            }
        };
        if let Err(err) = engine.start().await {
            tracing::error!(error = %err, "engine start failed");
            return ExitCode::from(3);
        }
        state.set_engine(engine).await;
    }

    let app = routes::management_routes(state.clone()).layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(cli.admin_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(address = %cli.admin_addr, error = %err, "failed to bind management API");
            return ExitCode::from(3);
        }
    };
    tracing::info!(address = %cli.admin_addr, "management API listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(wait_for_signal());
    if let Err(err) = serve.await {
        tracing::error!(error = %err, "management API failed");
    }

    tracing::info!("shutting down");
    state.shutdown().await;
    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
