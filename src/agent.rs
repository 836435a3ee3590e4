//! The conversation loop: one user turn in, one natural-language answer out.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{NimbusError, Result};
use crate::llm::LanguageModel;
use crate::memory::ConversationMemory;
use crate::message::{Message, ToolCall};
use crate::tool::ToolRegistry;

/// Alternates between the model and registered tools.
///
/// Owns the append-only transcript. Per turn it sends the full transcript
/// with the tool descriptions, satisfies every requested tool call with a
/// correlated tool-result message, then asks the model once more for the
/// final reply. When the model requests nothing, the first completion is
/// the final reply and the second call is skipped.
pub struct Agent<M: LanguageModel> {
    model: Arc<M>,
    tools: ToolRegistry,
    memory: ConversationMemory,
}

impl<M: LanguageModel> Agent<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            memory: ConversationMemory::default(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.memory.push(Message::system(prompt));
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Run a single exchange. Returns the final assistant reply.
    ///
    /// A model-call failure aborts only this turn; the transcript keeps
    /// every message appended so far and stays well-formed (no tool call is
    /// appended before its result can follow).
    pub async fn respond(&mut self, user_input: impl Into<String>) -> Result<String> {
        self.memory.push(Message::user(user_input));

        let descriptions = self.tools.describe();
        let completion = self
            .model
            .complete_chat(self.memory.as_slice(), &descriptions)
            .await?;
        tracing::debug!(?completion, "initial completion");

        if completion.tool_calls.is_empty() {
            let content = completion.content.ok_or_else(|| {
                NimbusError::Protocol("model returned neither content nor tool calls".into())
            })?;
            self.memory.push(Message::assistant(&content));
            return Ok(content);
        }

        self.memory.push(Message::assistant_tool_calls(
            completion.content,
            completion.tool_calls.clone(),
        ));

        for call in &completion.tool_calls {
            let content = match self.dispatch(call).await {
                Ok(output) => output.to_string(),
                // A failed lookup still yields a correlated tool-result
                // message so the transcript the model sees stays valid.
                Err(err) => {
                    tracing::warn!(tool = %call.name, error = %err, "tool call failed");
                    json!({ "error": err.to_string() }).to_string()
                }
            };
            self.memory
                .push(Message::tool_result(&call.id, &call.name, content));
        }

        tracing::debug!(transcript = ?self.memory.as_slice(), "message sequence before final completion");
        let final_completion = self.model.complete_chat(self.memory.as_slice(), &[]).await?;
        tracing::debug!(?final_completion, "final completion");
        let content = final_completion.content.ok_or_else(|| {
            NimbusError::Protocol("model returned no content for the final reply".into())
        })?;
        self.memory.push(Message::assistant(&content));
        Ok(content)
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<Value> {
        let arguments: Value = serde_json::from_str(&call.arguments).map_err(|err| {
            NimbusError::Protocol(format!(
                "tool `{}` arguments are not valid JSON: {err}",
                call.name
            ))
        })?;
        tracing::debug!(tool = %call.name, %arguments, "dispatching tool call");
        self.tools.call(&call.name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm::StubModel;
    use crate::message::Role;
    use crate::tool::Tool;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the payload back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn call(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "get_weather"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn call(&self, _input: Value) -> Result<Value> {
            Err(NimbusError::ExternalService(
                "weather request failed with 404 Not Found".into(),
            ))
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(EchoTool);
        tools
    }

    #[tokio::test]
    async fn no_tool_calls_means_single_model_call() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Hello!"}"#.into()]);
        let mut agent = Agent::new(model.clone()).with_tools(echo_registry());

        let reply = agent.respond("hi").await.unwrap();

        assert_eq!(reply, "Hello!");
        assert_eq!(model.calls(), 1);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn executes_tool_then_asks_for_final_reply() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"ping"}}"#.into(),
            r#"{"action":"respond","content":"Echoed your request."}"#.into(),
        ]);
        let mut agent = Agent::new(model.clone()).with_tools(echo_registry());

        let reply = agent.respond("say ping").await.unwrap();

        assert_eq!(reply, "Echoed your request.");
        assert_eq!(model.calls(), 2);

        // user, assistant(tool_calls), tool, assistant
        let roles: Vec<Role> = agent.memory().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn every_tool_call_gets_a_correlated_result() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"echo","arguments":{"text":"ping"}}"#.into(),
            r#"{"action":"respond","content":"done"}"#.into(),
        ]);
        let mut agent = Agent::new(model).with_tools(echo_registry());
        agent.respond("go").await.unwrap();

        let messages = agent.memory().as_slice();
        for message in messages {
            for call in &message.tool_calls {
                let matched = messages
                    .iter()
                    .filter(|m| {
                        m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call.id.as_str())
                    })
                    .count();
                assert_eq!(matched, 1, "tool call `{}` must have exactly one result", call.id);
            }
        }
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_result_not_crash() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"get_weather","arguments":{"location":"Atlantis"}}"#
                .into(),
            r#"{"action":"respond","content":"I could not find weather for Atlantis."}"#.into(),
        ]);
        let mut tools = ToolRegistry::new();
        tools.register(FailingTool);
        let mut agent = Agent::new(model).with_tools(tools);

        let reply = agent.respond("weather in Atlantis?").await.unwrap();
        assert_eq!(reply, "I could not find weather for Atlantis.");

        let tool_msg = agent
            .memory()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.as_ref().unwrap().contains("error"));
        assert!(tool_msg.content.as_ref().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_to_the_model() {
        let model = StubModel::new(vec![
            r#"{"action":"call_tool","name":"get_stock_price","arguments":{"symbol":"ACME"}}"#
                .into(),
            r#"{"action":"respond","content":"I cannot do that."}"#.into(),
        ]);
        let mut agent = Agent::new(model).with_tools(echo_registry());

        let reply = agent.respond("price of ACME?").await.unwrap();
        assert_eq!(reply, "I cannot do that.");

        let tool_msg = agent
            .memory()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert!(tool_msg.content.as_ref().unwrap().contains("not found"));
        assert_eq!(tool_msg.name.as_deref(), Some("get_stock_price"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_a_protocol_error() {
        let model = StubModel::new(Vec::new());
        let agent = Agent::new(model).with_tools(echo_registry());

        let err = agent
            .dispatch(&ToolCall {
                id: "call_x".into(),
                name: "echo".into(),
                arguments: "{not json".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NimbusError::Protocol(_)));
    }

    #[tokio::test]
    async fn model_failure_aborts_only_the_turn() {
        // Script one good turn, then nothing: the second turn's model call
        // fails, but the transcript keeps the user message and no orphaned
        // tool calls.
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Hi"}"#.into()]);
        let mut agent = Agent::new(model);

        agent.respond("hello").await.unwrap();
        let before = agent.memory().len();

        let err = agent.respond("again").await.unwrap_err();
        assert!(matches!(err, NimbusError::LanguageModel(_)));
        assert_eq!(agent.memory().len(), before + 1);
        assert!(agent.memory().iter().all(|m| m.tool_calls.is_empty()));
    }
}
