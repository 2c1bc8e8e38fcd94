use log::{error, info, warn};
use queue::ChannelProducer;
use rpc::NetConnector;
use service::{config::Config, logging::Logger};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logger: {e}");
        std::process::exit(1);
    }

    info!("Starting logic [{}]", config.runtime_env());

    let connector = Arc::new(NetConnector::new(
        config.dial_timeout(),
        config.rpc_timeout(),
    ));
    let (producer, records) = ChannelProducer::new();
    warn!(
        "No broker client is linked; records for {} on {:?} are logged, not sent",
        config.push_topic, config.kafka_addrs
    );
    tokio::spawn(queue::drain(records));

    let state = match logic::init(
        &config,
        connector.clone(),
        connector,
        Arc::new(producer),
    )
    .await
    {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize: {e}");
            std::process::exit(1);
        }
    };
    state.log_unavailable();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutting down");
    state.shutdown().await;
}
