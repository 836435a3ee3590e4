//! Rust building blocks for a tool-calling weather assistant.
//!
//! The crate provides a minimal runtime with:
//! - A language model abstraction (`LanguageModel`) and an OpenAI-format client.
//! - A simple tool interface (`Tool` and `ToolRegistry`).
//! - An `Agent` that loops between the model and tools, one user turn at a time.
//! - An OpenWeatherMap toolkit exposing the `get_weather` capability.

mod agent;
mod config;
mod error;
mod llm;
mod memory;
mod message;
mod shell;
mod telemetry;
mod tool;
pub mod tools;

pub use agent::Agent;
pub use config::{AppConfig, ModelConfig, WeatherConfig};
pub use error::{NimbusError, Result};
pub use llm::{LanguageModel, ModelCompletion, OpenAIClient, StubModel};
pub use memory::ConversationMemory;
pub use message::{Message, Role, ToolCall};
pub use shell::run_shell;
pub use telemetry::init_tracing;
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use tools::{weather_toolkit, GetWeatherTool, WeatherClient, WeatherReport};
