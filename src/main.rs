use repo_provisioner::azure::AzureDevOpsClient;
use repo_provisioner::git::GitCli;
use repo_provisioner::logging::{FileLogger, setup_logging};
use repo_provisioner::provision::Provisioner;
use repo_provisioner::run::DEFAULT_MAX_RUNS;
use repo_provisioner::{AppState, build_router, load_config};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "provisioner.toml";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("PROVISIONER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let file_logger = config.logging.directory.clone().map(FileLogger::new);
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Logging error: {}", e);
            std::process::exit(1);
        }
    };

    let azure = Arc::new(AzureDevOpsClient::new(config.base_url(), config.access_token()));
    let git = Arc::new(GitCli::new(config.access_token()));
    let provisioner = Provisioner::new(
        azure.clone(),
        git,
        azure,
        config.provision_settings(),
    );
    let state = Arc::new(AppState::new(provisioner, DEFAULT_MAX_RUNS));
    let app = build_router(state);

    info!("Using config at {:?}", config_path);
    info!("Azure DevOps organization at {}", config.base_url());
    info!("Listening on {}", bind_address);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
