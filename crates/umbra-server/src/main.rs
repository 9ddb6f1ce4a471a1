use std::process;
use umbra_logger::{init, log, LogSeverity::*};
use umbra_server::config::EngineConfig;
use umbra_server::server;

#[tokio::main]
async fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log(format!("Failed to load config {}: {}", path, e), Fatal);
                process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    if let Ok(severity) = config.log_severity() {
        init(severity);
    }

    log("Umbra init".to_owned(), Info);
    if let Err(e) = server::run(config).await {
        log(format!("Umbra stopped: {}", e), Fatal);
        process::exit(1);
    }
}
