use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::registry::ToolHandler;
use super::{execution_error, required_str};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

/// Runs model-written code in an external interpreter process.
///
/// The code is piped to the interpreter's stdin. Isolation is whatever the configured
/// command provides; the process is killed when the timeout elapses or the call is dropped.
pub struct CodeSandbox {
    tool: Tool,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CodeSandbox {
    /// `command` is the interpreter invocation, e.g. `python3` or `docker run -i --rm python:3.10 python`
    pub fn new(command: &str, timeout: Duration) -> AgentResult<Self> {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts
            .next()
            .ok_or_else(|| AgentError::Internal("empty sandbox command".to_string()))?;

        let tool = Tool::new(
            "code_interpreter",
            "Executes code in an isolated interpreter and returns its standard output, \
            standard error and exit code. Print the values you need to see.",
            json!({
                "type": "object",
                "required": ["code"],
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The source code to execute."
                    }
                }
            }),
        );

        Ok(Self {
            tool,
            program,
            args: parts.collect(),
            timeout,
        })
    }
}

#[async_trait]
impl ToolHandler for CodeSandbox {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> AgentResult<Value> {
        let code = required_str(&arguments, "code")?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| execution_error(format!("Unable to start the interpreter: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(execution_error)?;
            // closing stdin tells the interpreter the program is complete
            drop(stdin);
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.map_err(execution_error)?;
                Ok(json!({
                    "stdout": String::from_utf8_lossy(&output.stdout).trim(),
                    "stderr": String::from_utf8_lossy(&output.stderr).trim(),
                    "exit_code": output.status.code(),
                }))
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "code execution timed out");
                Ok(json!({
                    "stdout": "",
                    "stderr": format!(
                        "Code execution exceeded the timeout of {} seconds.",
                        self.timeout.as_secs()
                    ),
                    "exit_code": null,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_code_through_stdin() {
        let sandbox = CodeSandbox::new("sh", Duration::from_secs(10)).unwrap();
        let output = sandbox
            .call(json!({"code": "echo hello\necho oops 1>&2\nexit 3"}))
            .await
            .unwrap();

        assert_eq!(output["stdout"], "hello");
        assert_eq!(output["stderr"], "oops");
        assert_eq!(output["exit_code"], 3);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_in_stderr() {
        let sandbox = CodeSandbox::new("sh", Duration::from_secs(1)).unwrap();
        let output = sandbox.call(json!({"code": "sleep 5"})).await.unwrap();

        assert!(output["stderr"]
            .as_str()
            .unwrap()
            .contains("exceeded the timeout of 1 seconds"));
        assert!(output["exit_code"].is_null());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(CodeSandbox::new("  ", Duration::from_secs(1)).is_err());
    }
}
