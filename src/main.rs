use clap::Parser;
use kube_serverless::cli::{Cli, Commands, FunctionCommands, RenderCommands, RunCommands};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod main_actions;

pub fn init_tracing() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "kube_serverless=info,tower_http=info");
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_level(true)
        .with_ansi(true)
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { command } => match command {
            RunCommands::Api {
                namespace,
                port,
                metrics_port,
                in_memory,
            } => main_actions::run_api(namespace, port, metrics_port, in_memory).await,
            RunCommands::Runtime {
                port,
                code_path,
                function_name,
                handler,
                runtime,
                timeout_secs,
            } => {
                main_actions::run_runtime(
                    port,
                    code_path,
                    function_name,
                    handler,
                    runtime,
                    timeout_secs,
                )
                .await
            }
        },
        Commands::Function { command } => match command {
            FunctionCommands::Render {
                file,
                namespace,
                command,
            } => match command {
                RenderCommands::Print {} => {
                    main_actions::print_function_resources(file, namespace).await
                }
                RenderCommands::Write { output } => {
                    main_actions::write_function_resources_to_file(file, namespace, output).await
                }
            },
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}
