//! Spoken greetings through an external text-to-speech program.

use std::process::{Command, Stdio};
use warden_core::greeting::greeting_text;
use warden_core::ports::{GreetError, Greeter};

/// Runs `<program> "<greeting>"` and waits for it. An empty program name
/// leaves greetings to the log.
pub struct ProcessGreeter {
    program: String,
}

impl ProcessGreeter {
    pub fn new(program: &str) -> Self {
        let program = program.trim().to_string();
        if program.is_empty() {
            tracing::info!("no TTS command configured; greetings are logged only");
        }
        Self { program }
    }
}

impl Greeter for ProcessGreeter {
    fn greet(&mut self, name: &str) -> Result<(), GreetError> {
        if self.program.is_empty() {
            return Ok(());
        }

        let status = Command::new(&self.program)
            .arg(greeting_text(name))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(GreetError::Exit(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program_is_log_only() {
        assert!(ProcessGreeter::new("  ").greet("alice").is_ok());
    }

    #[test]
    fn test_successful_program() {
        assert!(ProcessGreeter::new("true").greet("alice").is_ok());
    }

    #[test]
    fn test_failing_program() {
        let err = ProcessGreeter::new("false").greet("alice").unwrap_err();
        assert!(matches!(err, GreetError::Exit(_)));
    }

    #[test]
    fn test_missing_program() {
        let err = ProcessGreeter::new("warden-no-such-tts").greet("alice").unwrap_err();
        assert!(matches!(err, GreetError::Spawn(_)));
    }
}
