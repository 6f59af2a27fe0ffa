use analyst_agent::{config::AgentConfig, Turn};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUESTION: &str =
    "Which product had the best sales among production sellers in year 2025?";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AgentConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter)?)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let question = if args.is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        args.join(" ")
    };

    info!(model = %config.model, tool = %config.tool_name, "Analyst agent starting");

    let agent = config.build_agent()?;
    let outcome = agent.run(&question).await;

    println!("\n=== AGENT RESULT ===");
    println!("Run ID: {}", outcome.run_id);
    println!("Question: {}", question);
    println!("\nResponse: {}", outcome.final_answer);
    println!(
        "\nTurns: {} ({} model call(s), {} tool call(s))",
        outcome.turn_count, outcome.model_calls, outcome.tool_calls
    );

    println!("\nConversation:");
    for (i, turn) in outcome.conversation.turns().iter().enumerate() {
        println!("  {}: {}", i + 1, turn);
    }

    if let Some(Turn::Error { reason }) = outcome.conversation.last() {
        eprintln!("Run ended without an answer: {}", reason);
        std::process::exit(1);
    }

    Ok(())
}
