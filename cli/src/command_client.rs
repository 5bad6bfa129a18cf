//! Completion transport that runs an external command.
//!
//! The prompt goes to the command's stdin and the model answer is read from
//! its stdout. Model settings travel as environment variables:
//! `SOLVEX_SYSTEM_PROMPT`, `SOLVEX_MODEL`, `SOLVEX_MAX_TOKENS`,
//! `SOLVEX_TEMPERATURE`, and `OPENAI_API_KEY` when a key is configured.
//!
//! With a deadline the child is killed once it runs out of time, so a
//! command abandoned by the fallback timeout does not outlive the call.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use solvex::fallback::CompletionClient;
use solvex::{ExternalServiceError, ModelConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct CommandClient {
    program: String,
    args: Vec<String>,
    api_key: Option<String>,
    deadline: Option<Duration>,
}

impl CommandClient {
    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(command_line: &str, api_key: Option<String>) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            api_key,
            deadline: None,
        })
    }

    /// Kill the command when it runs longer than `limit`.
    pub fn with_deadline(mut self, limit: Duration) -> Self {
        self.deadline = Some(limit);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ExternalServiceError> {
        let failed =
            |e: std::io::Error| ExternalServiceError::Request(format!("{} failed: {}", self.program, e));
        let Some(limit) = self.deadline else {
            return child.wait().map_err(failed);
        };

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(failed)? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                log::warn!("{} still running after {:?}, killing it", self.program, limit);
                // the child may have exited between the poll and the kill
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExternalServiceError::Timeout(limit));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CompletionClient for CommandClient {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
        config: &ModelConfig,
    ) -> Result<String, ExternalServiceError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("SOLVEX_SYSTEM_PROMPT", system)
            .env("SOLVEX_MODEL", &config.model)
            .env("SOLVEX_MAX_TOKENS", config.max_tokens.to_string())
            .env("SOLVEX_TEMPERATURE", config.temperature.to_string());
        if let Some(key) = &self.api_key {
            cmd.env("OPENAI_API_KEY", key);
        }

        let mut child = cmd.spawn().map_err(|e| {
            ExternalServiceError::Unavailable(format!("cannot start {}: {}", self.program, e))
        })?;

        let stdin = child.stdin.take();
        let input = prompt.as_bytes().to_vec();
        let writer = std::thread::spawn(move || match stdin {
            Some(mut pipe) => pipe.write_all(&input),
            None => Ok(()),
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let written = writer.join().unwrap_or(Ok(()));
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let message = format!("{} exited with {}: {}", self.program, status, stderr.trim());
            let lower = stderr.to_lowercase();
            if lower.contains("401") || lower.contains("unauthorized") || lower.contains("api key") {
                return Err(ExternalServiceError::Auth(message));
            }
            return Err(ExternalServiceError::Request(message));
        }
        written.map_err(|e| ExternalServiceError::Request(format!("cannot write prompt: {}", e)))?;

        String::from_utf8(stdout)
            .map_err(|e| ExternalServiceError::MalformedResponse(format!("answer is not UTF-8: {}", e)))
    }
}

/// Read a child pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}
