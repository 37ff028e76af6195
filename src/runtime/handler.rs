//! Handler capability of the function runtime.
//!
//! [`ProcessHandler`] runs the function code in a child process per invocation.
//! The event is written to the child's stdin as JSON and the result is read back
//! from its stdout as JSON. Anything the code logs goes to stderr and is
//! forwarded to the runtime's own log.

use super::event::Event;
use crate::function::runtime::Runtime;
use async_trait::async_trait;
use serde_json::Value;
use std::{
    io,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};
use thiserror::Error as ThisError;
use tokio::{io::AsyncWriteExt, process::Command};

/// Environment variables the child process reads to locate the handler.
pub const CHILD_CODE_PATH_ENV_VAR: &str = "FUNCTION_CODE_PATH";
pub const CHILD_EXPORT_ENV_VAR: &str = "FUNCTION_EXPORT";

const NODE_PROGRAM: &str = "node";
const PYTHON_PROGRAM: &str = "python3";

const NODE_BOOTSTRAP: &str = r#"
const log = (...args) => process.stderr.write(args.map(String).join(' ') + '\n');
console.log = console.info = console.debug = log;
const mod = require(require('path').resolve(process.env.FUNCTION_CODE_PATH));
const fn = mod[process.env.FUNCTION_EXPORT] || mod.handler || mod;
let input = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { input += chunk; });
process.stdin.on('end', async () => {
  try {
    if (typeof fn !== 'function') throw new Error('handler is not a function');
    const result = await fn(JSON.parse(input));
    process.stdout.write(JSON.stringify(result === undefined ? null : result));
  } catch (error) {
    process.stderr.write(String((error && error.stack) || error) + '\n');
    process.exit(1);
  }
});
"#;

const PYTHON_BOOTSTRAP: &str = r#"
import asyncio, contextlib, inspect, json, os, runpy, sys
with contextlib.redirect_stdout(sys.stderr):
    module = runpy.run_path(os.environ["FUNCTION_CODE_PATH"])
    handler = module.get(os.environ["FUNCTION_EXPORT"]) or module.get("handler")
    if not callable(handler):
        raise SystemExit("handler is not callable")
    result = handler(json.load(sys.stdin))
    if inspect.isawaitable(result):
        result = asyncio.run(result)
sys.stdout.write(json.dumps(result))
"#;

#[derive(ThisError, Debug)]
pub enum HandlerError {
    #[error("Failed to serialize event: {0}")]
    Event(#[source] serde_json::Error),
    #[error("Failed to start handler process: {0}")]
    Spawn(#[source] io::Error),
    #[error("Failed to communicate with handler process: {0}")]
    Io(#[source] io::Error),
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),
    #[error("Handler failed with exit code {code:?}: {message}")]
    Failed { code: Option<i32>, message: String },
    #[error("Handler returned invalid JSON: {0}")]
    InvalidOutput(#[source] serde_json::Error),
}

#[derive(ThisError, Debug)]
pub enum LoadError {
    #[error("Code file {path:?} is not accessible: {error}")]
    Inaccessible {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Code file {0:?} is not a regular file")]
    NotAFile(PathBuf),
    #[error("Code file {0:?} is not executable")]
    NotExecutable(PathBuf),
    #[error("Interpreter {program:?} is not available: {error}")]
    Interpreter {
        program: &'static str,
        #[source]
        error: io::Error,
    },
}

/// Turns an event into a result value.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn invoke(&self, event: Event) -> Result<Value, HandlerError>;
}

/// Returns the event unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn invoke(&self, event: Event) -> Result<Value, HandlerError> {
        serde_json::to_value(event).map_err(HandlerError::Event)
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub function_name: String,
    pub code_path: PathBuf,
    /// `module.export`, only the last segment is used.
    pub handler: String,
    pub runtime: Runtime,
    pub timeout: Duration,
}

impl HandlerConfig {
    pub fn export_name(&self) -> &str {
        self.handler.rsplit('.').next().unwrap_or_default()
    }
}

#[derive(Debug)]
pub struct ProcessHandler {
    config: HandlerConfig,
}

impl ProcessHandler {
    /// Validates the code file and the runtime's interpreter.
    pub async fn load(config: HandlerConfig) -> Result<Self, LoadError> {
        check_code_file(&config.code_path, config.runtime).await?;

        if let Some(program) = interpreter(config.runtime) {
            Command::new(program)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .map_err(|error| LoadError::Interpreter { program, error })?;
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut command = match self.config.runtime {
            Runtime::NodeJs18 => {
                let mut command = Command::new(NODE_PROGRAM);
                command.arg("-e").arg(NODE_BOOTSTRAP);
                command
            }
            Runtime::Python39 => {
                let mut command = Command::new(PYTHON_PROGRAM);
                command.arg("-c").arg(PYTHON_BOOTSTRAP);
                command
            }
            Runtime::Go119 => Command::new(&self.config.code_path),
        };

        command
            .env(CHILD_CODE_PATH_ENV_VAR, &self.config.code_path)
            .env(CHILD_EXPORT_ENV_VAR, self.config.export_name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }

    async fn run(&self, input: Vec<u8>) -> Result<Output, HandlerError> {
        let mut child = self.command().spawn().map_err(HandlerError::Spawn)?;
        let stdin = child.stdin.take();

        // Stdin is written while the output is drained, otherwise a handler that
        // fills its stdout pipe before reading would block forever.
        let write_input = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&input).await {
                    // The handler may exit without reading its input.
                    Err(error) if error.kind() != io::ErrorKind::BrokenPipe => {
                        return Err(HandlerError::Io(error));
                    }
                    _ => {}
                }
            }
            Ok(())
        };

        let (written, output) = tokio::join!(write_input, child.wait_with_output());
        written?;

        output.map_err(HandlerError::Io)
    }
}

#[async_trait]
impl Handler for ProcessHandler {
    async fn invoke(&self, event: Event) -> Result<Value, HandlerError> {
        let input = serde_json::to_vec(&event).map_err(HandlerError::Event)?;

        let output = tokio::time::timeout(self.config.timeout, self.run(input))
            .await
            .map_err(|_| HandlerError::Timeout(self.config.timeout))??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|line| !line.trim().is_empty()) {
            tracing::info!(function = %self.config.function_name, "{line}");
        }

        if !output.status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output")
                .to_string();

            return Err(HandlerError::Failed {
                code: output.status.code(),
                message,
            });
        }

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&output.stdout).map_err(HandlerError::InvalidOutput)
    }
}

fn interpreter(runtime: Runtime) -> Option<&'static str> {
    match runtime {
        Runtime::NodeJs18 => Some(NODE_PROGRAM),
        Runtime::Python39 => Some(PYTHON_PROGRAM),
        Runtime::Go119 => None,
    }
}

async fn check_code_file(path: &Path, runtime: Runtime) -> Result<(), LoadError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|error| LoadError::Inaccessible {
            path: path.to_path_buf(),
            error,
        })?;

    if !metadata.is_file() {
        return Err(LoadError::NotAFile(path.to_path_buf()));
    }

    if runtime == Runtime::Go119 && !is_executable(&metadata) {
        return Err(LoadError::NotExecutable(path.to_path_buf()));
    }

    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}
