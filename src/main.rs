use std::sync::Arc;

use anyhow::Context;

use agent_scheduler::config::CoordinatorConfig;
use agent_scheduler::control::control_routes;
use agent_scheduler::coordinator::Coordinator;
use agent_scheduler::engine::HttpAgentEngine;
use agent_scheduler::error::ConfigError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CoordinatorConfig::from_env()?;
    let endpoint = config
        .agent_endpoint
        .clone()
        .ok_or_else(|| ConfigError::MissingEnvVar("TASK_AGENT_ENDPOINT".to_string()))?;
    let port = config.http_port;

    eprintln!("🗓  Agent Scheduler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Agent endpoint: {}", endpoint);
    eprintln!("   Max concurrent: {}", config.max_concurrent);
    eprintln!("   Reply WS: ws://0.0.0.0:{}/ws", port);
    eprintln!("   Task API: http://0.0.0.0:{}/api/tasks", port);
    eprintln!(
        "   Scheduler: {}\n",
        if config.autostart { "running" } else { "idle (POST /api/scheduler/start)" }
    );

    let engine = Arc::new(HttpAgentEngine::new(endpoint, config.callback_base()));
    let coordinator = Arc::new(Coordinator::new(config, engine)?);

    let app = control_routes(coordinator.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind control port {port}"))?;
    tracing::info!(port, "Control server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("control server failed")?;

    coordinator.shutdown().await;
    Ok(())
}
