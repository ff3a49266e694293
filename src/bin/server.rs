use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use auth_gate::auth::provider::FileUserProvider;
use auth_gate::config::GateConfig;
use auth_gate::core::regulator::MemoryRegulator;
use auth_gate::core::server::{routes, SessionCookie};
use auth_gate::core::session::MemorySessionProvider;
use auth_gate::handlers::first_factor::{FirstFactorGate, GateProviders};
use auth_gate::handlers::response::RedirectResponseEmitter;
use auth_gate::security_logger::{SecurityEvent, SecurityLogger};

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    let security_logger = Arc::new(SecurityLogger::new());
    security_logger.clone().start_cleanup_task();

    let config = match GateConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            security_logger
                .log_event(SecurityEvent::ConfigurationError {
                    component: "config".to_string(),
                    error: e.to_string(),
                })
                .await;
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Configuration: host={}, port={}, timing mitigation={}, window={}",
        config.host, config.port, config.timing.enabled, config.timing.window_size
    );

    let users = match FileUserProvider::from_file(&config.users_file) {
        Ok(users) => {
            info!("Loaded {} users from {}", users.user_count(), config.users_file);
            users
        }
        Err(e) => {
            error!("Failed to load users database: {}", e);
            std::process::exit(1);
        }
    };

    let regulator = match MemoryRegulator::new(config.regulation, config.max_tracked_users) {
        Ok(regulator) => regulator,
        Err(e) => {
            error!("Failed to initialize regulator: {}", e);
            std::process::exit(1);
        }
    };

    let sessions = Arc::new(MemorySessionProvider::new(
        config.session.expiration,
        config.session.remember_me,
    ));
    sessions.clone().start_cleanup_task();

    let providers = GateProviders {
        regulator: Arc::new(regulator),
        users: Arc::new(users),
        sessions,
        responder: Arc::new(RedirectResponseEmitter::new(
            config.session.domain.clone(),
            config.default_redirection_url.clone(),
        )),
    };

    let gate = FirstFactorGate::new(providers, &config.timing)
        .with_refresh_interval(config.refresh_interval)
        .with_security_logger(security_logger);

    let cookie = SessionCookie::new(config.session.cookie_name.clone(), config.session.domain.clone());
    let routes = routes(Arc::new(gate), cookie);

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    match (config.enable_tls, &config.tls_cert_path, &config.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            info!("Starting auth gate server on https://{}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .run(addr)
                .await;
        }
        _ => {
            warn!("TLS is disabled, session cookies require a TLS terminating proxy in front of the gate");
            info!("Starting auth gate server on http://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
