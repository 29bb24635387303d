use std::sync::Arc;

use chrono::Duration;
use dotenv::dotenv;
use shopline_lib::auth::PinSessions;
use shopline_lib::cli;
use shopline_lib::config::Config;
use shopline_lib::logging::{format_error_report, init_logging};
use shopline_lib::notify::ChangeNotifier;
use shopline_lib::queue::types::ShopConfig;
use shopline_lib::server::setup_server;
use shopline_lib::service::QueueService;
use shopline_lib::state::AppState;
use shopline_lib::store::MemoryStore;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let args = cli::parse_args();
    let logging_context = init_logging("shopline", &args.log_level);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config_invalid", error = %err, "configuration error");
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };
    let bind_addr = args.bind.unwrap_or(config.bind_addr);

    let store = Arc::new(MemoryStore::new(ShopConfig::default()));
    let notifier = ChangeNotifier::new(config.event_buffer);
    let service = QueueService::new(store, notifier.clone());
    let sessions = PinSessions::new(
        config.staff_pin,
        config.admin_pin,
        Duration::hours(config.session_ttl_hours),
    );

    let shutdown_token = CancellationToken::new();
    let state = Arc::new(AppState::new(
        service,
        sessions,
        notifier,
        shutdown_token.clone(),
    ));

    let server_handle = match setup_server(state, bind_addr).await {
        Ok(handle) => handle,
        Err(err) => {
            let error_report = format_error_report(&err);
            error!(
                event = "server_start_failed",
                bind = %bind_addr,
                error = %err,
                error_report = %error_report,
                "failed to bind HTTP server"
            );
            eprintln!("failed to bind {bind_addr}: {err}");
            std::process::exit(1);
        }
    };
    info!(
        event = "server_started",
        bind = %bind_addr,
        run_id = %logging_context.run_id,
        "queue server listening"
    );

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            info!(event = "shutdown_signal", signal = "SIGTERM", "shutting down");
        }
        _ = sigint.recv() => {
            info!(event = "shutdown_signal", signal = "SIGINT", "shutting down");
        }
    }

    shutdown_token.cancel();
    let _ = server_handle.await;
}
