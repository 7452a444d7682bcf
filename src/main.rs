use fileserv::{ConnectionEngine, ServerConfig};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let config = if args.len() > 1 {
        if !Path::new(&args[1]).exists() {
            log::error!("config file not found: {}", args[1]);
            process::exit(1);
        }
        match ServerConfig::from_json_file(&args[1]) {
            Ok(config) => config,
            Err(e) => {
                log::error!("failed to load {}: {}", args[1], e);
                process::exit(1);
            }
        }
    } else {
        ServerConfig::new()
    };

    log::info!(
        "starting on {} with {} worker threads ({:?} poller)",
        config.socket_address(),
        config.worker_threads,
        config.poller
    );

    let mut engine = match ConnectionEngine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("startup failed: {}", e);
            process::exit(1);
        }
    };

    ctrlc::set_handler(|| {
        log::info!("received shutdown signal, stopping");
        process::exit(0);
    })
    .expect("Error setting Ctrl-C handler");

    if let Err(e) = engine.run() {
        log::error!("server loop failed: {}", e);
        process::exit(1);
    }
}
