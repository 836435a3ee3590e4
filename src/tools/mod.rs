//! Tool implementations the agent can expose to the model.

pub mod weather;

pub use weather::{weather_toolkit, GetWeatherTool, WeatherClient, WeatherReport};
