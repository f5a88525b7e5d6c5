//! Agent runtime collaborator
//!
//! The agent is external: it receives the rendered skill document and the
//! scenario prompt as owned text and answers with free-form text. Nothing
//! else crosses the boundary, so runs cannot share state.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Separator written between the document and the scenario on stdin
pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

/// Agent runtime failures; every variant is recorded as `RuntimeUnavailable`
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("agent exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The agent that produces decisions
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Answer `scenario_text` under the governance of `document_text`
    ///
    /// # Errors
    /// `RuntimeError` when the agent cannot produce an answer.
    async fn evaluate(&self, document_text: String, scenario_text: String) -> Result<String, RuntimeError>;
}

/// Runs a command per evaluation: document and scenario on stdin, answer on
/// stdout
///
/// The child is killed if the run is dropped, which is how deadlines and
/// cancellation reach it.
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    program: String,
    args: Vec<String>,
}

impl ProcessAgent {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Split a whitespace-separated command line; `None` if it is blank
    #[must_use]
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).with_args(parts))
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl AgentRuntime for ProcessAgent {
    async fn evaluate(&self, document_text: String, scenario_text: String) -> Result<String, RuntimeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Unavailable(format!("cannot start {}: {e}", self.program)))?;

        // Fed while stdout drains, so neither pipe can fill and stall.
        let stdin = child.stdin.take();
        let prompt = [document_text.as_str(), PROMPT_SEPARATOR, scenario_text.as_str()].concat();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            // An agent may exit without reading its input.
            match stdin.write_all(prompt.as_bytes()).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed?;
        let output = output?;
        if !output.status.success() {
            return Err(RuntimeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splits_program_and_args() {
        let agent = ProcessAgent::from_command_line("  claude -p --model x ").unwrap();
        assert_eq!(agent.program(), "claude");
        assert_eq!(agent.args, vec!["-p", "--model", "x"]);
        assert!(ProcessAgent::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_agent_round_trips_stdin() {
        let out = ProcessAgent::new("cat")
            .evaluate("# doc".into(), "pick one".into())
            .await
            .unwrap();
        assert_eq!(out, format!("# doc{PROMPT_SEPARATOR}pick one"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chatty_agent_with_large_document_does_not_stall() {
        let agent = ProcessAgent::new("sh").with_args(["-c", "yes x | head -c 200000; cat >/dev/null"]);
        let document = "rule\n".repeat(200_000);
        let out = tokio::time::timeout(std::time::Duration::from_secs(30), agent.evaluate(document, "pick".into()))
            .await
            .expect("agent finished before the timeout")
            .unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_process_is_an_error() {
        let err = ProcessAgent::new("false")
            .evaluate(String::new(), String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Exit { .. }));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = ProcessAgent::new("crucible-no-such-agent-binary")
            .evaluate(String::new(), String::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Unavailable(_)));
    }
}
