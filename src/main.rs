use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use wacall_relay::api::{self, AppState};
use wacall_relay::config::{Cli, RelayConfig};
use wacall_relay::graph::GraphClient;
use wacall_relay::relay::Relay;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        let config = match RelayConfig::load(&cli) {
            Ok(config) => Arc::new(config),
            Err(e) => {
                error!("Configuration error: {e:#}");
                std::process::exit(2);
            }
        };

        let http = reqwest::Client::new();
        let signaling = Arc::new(GraphClient::new(
            http.clone(),
            &config.graph.base_url,
            &config.graph.api_version,
            &config.graph.phone_number_id,
            config.graph.access_token.clone(),
        ));
        // The binary ships without an answer provider; non-manual
        // policies need one wired in by an embedding crate.
        let relay = Relay::new(signaling, config.answer_policy, None);

        let app = api::router(AppState {
            relay,
            http,
            config: config.clone(),
        });

        let listener = match tokio::net::TcpListener::bind(config.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Cannot bind {}: {e}", config.bind);
                std::process::exit(1);
            }
        };
        info!(
            "Relay listening on {} (answer policy {:?})",
            config.bind, config.answer_policy
        );

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Server error: {e}");
        }
        info!("Relay shut down");
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }
    info!("Shutdown signal received, draining connections");
}
