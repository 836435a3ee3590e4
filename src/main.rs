use std::sync::Arc;

use tokio::io::BufReader;

use nimbus::{run_shell, weather_toolkit, Agent, AppConfig, OpenAIClient, Result};

const SYSTEM_PROMPT: &str =
    "You are a weather assistant. Use the get_weather tool to answer questions \
     about the current weather, and reply in plain natural language.";

#[tokio::main]
async fn main() -> Result<()> {
    nimbus::init_tracing();

    let config = AppConfig::load("nimbus.toml")?;
    let model = Arc::new(OpenAIClient::from_config(&config.model)?);
    let tools = weather_toolkit(&config.weather)?;
    let mut agent = Agent::new(model)
        .with_tools(tools)
        .with_system_prompt(SYSTEM_PROMPT);

    println!("Welcome to the Weather AI Assistant!");
    println!(
        "Please enter a question with city and country for the location you want \
         to ask about the weather, e.g., \
         \"What's the weather like in San Francisco, United States?\"."
    );
    println!("Type \"exit\" to quit.");

    run_shell(&mut agent, BufReader::new(tokio::io::stdin())).await?;

    println!("\nGoodbye!");
    Ok(())
}
