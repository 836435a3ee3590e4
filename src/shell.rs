//! The interactive shell: purely presentational, no business logic.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::agent::Agent;
use crate::error::Result;
use crate::llm::LanguageModel;

/// Drive the agent one input line per turn until the case-insensitive
/// `exit` keyword. EOF behaves like `exit`; blank lines are re-prompted.
///
/// A failed turn is reported and the loop continues; only an input error
/// ends the session early.
pub async fn run_shell<M, R>(agent: &mut Agent<M>, reader: R) -> Result<()>
where
    M: LanguageModel,
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        match agent.respond(input).await {
            Ok(reply) => println!("\n{reply}\n"),
            Err(err) => {
                tracing::error!(error = %err, "turn failed");
                eprintln!("\nerror: {err}\n");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::BufReader;

    use crate::llm::StubModel;

    // An empty script means any model call would error, so a clean exit
    // doubles as proof that no API call was made.
    fn silent_agent() -> (std::sync::Arc<StubModel>, Agent<StubModel>) {
        let model = StubModel::new(Vec::new());
        (model.clone(), Agent::new(model))
    }

    #[tokio::test]
    async fn exit_is_case_insensitive_and_makes_no_model_calls() {
        let (model, mut agent) = silent_agent();

        run_shell(&mut agent, BufReader::new(&b"EXIT\n"[..]))
            .await
            .unwrap();

        assert_eq!(model.calls(), 0);
        assert!(agent.memory().is_empty());
    }

    #[tokio::test]
    async fn eof_behaves_like_exit() {
        let (model, mut agent) = silent_agent();

        run_shell(&mut agent, BufReader::new(&b""[..])).await.unwrap();

        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn blank_lines_are_reprompted_not_sent() {
        let (model, mut agent) = silent_agent();

        run_shell(&mut agent, BufReader::new(&b"\n   \nexit\n"[..]))
            .await
            .unwrap();

        assert_eq!(model.calls(), 0);
        assert!(agent.memory().is_empty());
    }

    #[tokio::test]
    async fn completed_turn_then_exit() {
        let model = StubModel::new(vec![r#"{"action":"respond","content":"Sunny."}"#.into()]);
        let mut agent = Agent::new(model.clone());

        run_shell(&mut agent, BufReader::new(&b"weather?\nexit\n"[..]))
            .await
            .unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn failed_turn_does_not_end_the_session() {
        // No scripted responses: the turn's model call fails, but the loop
        // still reaches the exit keyword and returns cleanly.
        let (model, mut agent) = silent_agent();

        run_shell(&mut agent, BufReader::new(&b"hello\nexit\n"[..]))
            .await
            .unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(agent.memory().len(), 1); // the user message stays appended
    }
}
