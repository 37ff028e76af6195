use crate::{
    consts::{
        DEFAULT_FUNCTION_CODE_PATH, DEFAULT_FUNCTION_HANDLER, DEFAULT_FUNCTION_TIMEOUT_SECS,
        DEFAULT_METRICS_PORT, DEFAULT_NAMESPACE, DEFAULT_PORT, FUNCTION_CODE_PATH_ENV_VAR,
        FUNCTION_HANDLER_ENV_VAR, FUNCTION_NAME_ENV_VAR, FUNCTION_TIMEOUT_ENV_VAR,
        METRICS_PORT_ENV_VAR, NAMESPACE_ENV_VAR, PORT_ENV_VAR, RUNTIME_ENV_VAR,
    },
    function::runtime::Runtime,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs one of the platform's processes
    #[clap(visible_alias = "r")]
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Function spec commands
    #[clap(visible_alias = "f")]
    Function {
        #[command(subcommand)]
        command: FunctionCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Runs the control plane REST API
    #[clap(visible_alias = "a")]
    Api {
        /// The namespace functions are deployed to
        #[clap(short, long, env = NAMESPACE_ENV_VAR, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
        /// The port of the REST API
        #[clap(short, long, env = PORT_ENV_VAR, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// The port of the Prometheus metrics endpoint
        #[clap(short, long, env = METRICS_PORT_ENV_VAR, default_value_t = DEFAULT_METRICS_PORT)]
        metrics_port: u16,
        /// Keeps all resources in memory instead of a Kubernetes cluster
        #[clap(long)]
        in_memory: bool,
    },
    /// Runs the function runtime serving invocations of one function
    #[clap(visible_alias = "rt")]
    Runtime {
        /// The port invocations are served on
        #[clap(short, long, env = PORT_ENV_VAR, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// The path to the function code
        #[clap(short, long, env = FUNCTION_CODE_PATH_ENV_VAR, default_value = DEFAULT_FUNCTION_CODE_PATH)]
        code_path: PathBuf,
        /// The name of the function, used in logs
        #[clap(long, env = FUNCTION_NAME_ENV_VAR, default_value = "")]
        function_name: String,
        /// The handler entry point, e.g. `index.handler`
        #[clap(long, env = FUNCTION_HANDLER_ENV_VAR, default_value = DEFAULT_FUNCTION_HANDLER)]
        handler: String,
        /// The runtime identifier. Unknown identifiers fall back to `nodejs18`
        #[clap(short, long, env = RUNTIME_ENV_VAR, default_value_t = Runtime::default().to_string())]
        runtime: String,
        /// Invocations running longer than this are aborted
        #[clap(short, long, env = FUNCTION_TIMEOUT_ENV_VAR, default_value_t = DEFAULT_FUNCTION_TIMEOUT_SECS)]
        timeout_secs: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum FunctionCommands {
    /// Converts a function spec to Kubernetes resources
    #[clap(visible_alias = "re")]
    Render {
        /// The path to the function spec (YAML or JSON)
        #[clap(short = 'f', long)]
        file: PathBuf,
        /// The namespace the resources are rendered for
        #[clap(short, long, env = NAMESPACE_ENV_VAR, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        #[command(subcommand)]
        command: RenderCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum RenderCommands {
    /// Writes the Kubernetes resources to a file
    #[clap(visible_alias = "w")]
    Write {
        /// The path to the file to write the Kubernetes resources to
        #[clap(short, long)]
        output: PathBuf,
    },
    /// Prints the Kubernetes resources to stdout
    #[clap(visible_alias = "p")]
    Print {},
}
