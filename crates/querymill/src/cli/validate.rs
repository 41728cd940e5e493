//! External validation client.
//!
//! The graph-database engine stays a black box: validation is a
//! configured command that receives the candidate query on stdin and
//! answers with its exit status. Exit 0 means the candidate is valid;
//! anything else is a failure whose stderr becomes the diagnostic.

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::debug;

/// Pass/fail verdict with a diagnostic on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

/// Runs an external command as the validation engine client.
pub struct CommandValidator {
    command: String,
}

impl CommandValidator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn validate(&self, candidate: &str) -> Result<Verdict> {
        debug!(command = %self.command, "running validator");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn validator: {}", self.command))?;

        child
            .stdin
            .take()
            .context("validator stdin unavailable")?
            .write_all(candidate.as_bytes())
            .context("Failed to write candidate to validator")?;

        let output = child
            .wait_with_output()
            .context("Failed to wait for validator")?;

        if output.status.success() {
            return Ok(Verdict::Valid);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let diagnostic = if stderr.is_empty() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if stdout.is_empty() {
                format!("validator exited with {}", output.status)
            } else {
                stdout
            }
        } else {
            stderr
        };
        Ok(Verdict::Invalid(diagnostic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_verdict() {
        let validator = CommandValidator::new("cat > /dev/null");
        assert_eq!(validator.validate("match $x;").unwrap(), Verdict::Valid);
    }

    #[test]
    fn test_invalid_verdict_carries_stderr() {
        let validator = CommandValidator::new("cat > /dev/null; echo 'size() unsupported' >&2; exit 1");
        let verdict = validator.validate("match size();").unwrap();
        assert_eq!(verdict, Verdict::Invalid("size() unsupported".to_string()));
    }
}
