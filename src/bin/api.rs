use analyst_agent::{api::start_server, config::AgentConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AgentConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter)?)
        .init();

    info!("Analyst Agent - API Server");
    info!("Port: {}", config.port);
    info!("Model: {} | Tool: {}", config.model, config.tool_name);

    let agent = Arc::new(config.build_agent()?);

    info!("Agent initialized");

    start_server(agent, config.port).await?;

    Ok(())
}
