//! DeviceCheck Gateway Binary
//!
//! Runs the HTTP gateway in front of Apple's DeviceCheck API.

use std::env;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use devicecheck_client::{ClientConfig, DeviceCheck, DeviceTokenValidator, MockValidator};
use devicecheck_gate::{
    create_router, AppState, AxumGate, AxumTokenExtractor, GateConfig, InvalidDeviceResponse,
};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("DEVICECHECK_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    // Configuration
    let port: u16 = env::var("DEVICECHECK_GATE_PORT")
        .unwrap_or_else(|_| "8080".into())
        .parse()
        .expect("DEVICECHECK_GATE_PORT must be a valid port number");

    let config = ClientConfig::from_env().expect("Invalid DeviceCheck configuration");
    let environment = config.environment;
    let client = Arc::new(DeviceCheck::new(config).expect("Failed to create DeviceCheck client"));

    let validator: Arc<dyn DeviceTokenValidator> = match env::var("DEVICECHECK_MOCK_TOKEN") {
        Ok(token) if !token.is_empty() => {
            warn!("DEVICECHECK_MOCK_TOKEN is set; only the mock token will be accepted");
            Arc::new(MockValidator::new(token))
        }
        _ => client.clone(),
    };

    let gate: Arc<AxumGate> = Arc::new(
        AxumGate::new(
            validator,
            AxumTokenExtractor::new(),
            InvalidDeviceResponse::default(),
        )
        .with_config(GateConfig::from_env()),
    );

    info!(environment = %environment, port = port, "Starting DeviceCheck gateway");

    let state = Arc::new(AppState { client });
    let app = create_router(state, gate);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "DeviceCheck gateway listening");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
