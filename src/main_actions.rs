use anyhow::{Context, Result as AnyResult};
use kube_serverless::{
    api::{self, ApiState},
    function::{file::read_function_file, manifest::Manifest, runtime::Runtime, Function},
    runtime::{self, handler::HandlerConfig, Dispatcher},
    substrate::{cluster::KubeSubstrate, memory::MemorySubstrate, Substrate},
};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, signal};
use tracing::{trace_span, Instrument};

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl+C.");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received.");
}

async fn bind(port: u16) -> AnyResult<TcpListener> {
    let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind to {address}"))
}

async fn serve_api<S: Substrate>(substrate: S, port: u16, metrics_port: u16) -> AnyResult<()> {
    let state = Arc::new(ApiState::new(substrate).context("Failed to register metrics")?);

    if let Err(error) = state.orchestrator.ping().await {
        tracing::warn!(%error, "Substrate is not ready yet.");
    }

    let metrics_listener = bind(metrics_port).await?;
    let metrics_app = api::metrics_router(state.clone());
    tokio::spawn(
        async move {
            tracing::info!(port = metrics_port, "Serving metrics.");
            if let Err(error) = axum::serve(metrics_listener, metrics_app).await {
                tracing::error!(%error, "Metrics server failed.");
            }
        }
        .instrument(trace_span!("Metrics")),
    );

    let listener = bind(port).await?;
    tracing::info!(%port, "Serving API.");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")
}

pub async fn run_api(
    namespace: String,
    port: u16,
    metrics_port: u16,
    in_memory: bool,
) -> AnyResult<()> {
    tracing::info!(%namespace, %port, %metrics_port, %in_memory, "Running with current config.");

    if in_memory {
        return serve_api(MemorySubstrate::new(namespace), port, metrics_port).await;
    }

    let substrate = KubeSubstrate::try_default(namespace)
        .await
        .context("Failed to create kubernetes client")?;

    serve_api(substrate, port, metrics_port).await
}

pub async fn run_runtime(
    port: u16,
    code_path: PathBuf,
    function_name: String,
    handler: String,
    runtime: String,
    timeout_secs: u64,
) -> AnyResult<()> {
    let config = HandlerConfig {
        function_name,
        code_path,
        handler,
        runtime: Runtime::resolve(&runtime),
        timeout: Duration::from_secs(timeout_secs),
    };

    tracing::info!(
        function = %config.function_name,
        handler = %config.handler,
        runtime = %config.runtime,
        code_path = ?config.code_path,
        "Running with current config."
    );

    let dispatcher = Dispatcher::load(config)
        .instrument(trace_span!("Load"))
        .await
        .context("Failed to register metrics")?;

    let listener = bind(port).await?;
    tracing::info!(%port, "Serving invocations.");

    axum::serve(listener, runtime::router(Arc::new(dispatcher)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Runtime server failed")
}

async fn render(file: PathBuf, namespace: &str) -> AnyResult<String> {
    let function: Function = read_function_file(&file)
        .await
        .context("Failed to read function spec")?;

    function
        .validate_name()
        .with_context(|| format!("Invalid function name {:?}", function.name))?;

    Manifest::new(&function, namespace)
        .to_yaml_string()
        .context("Failed to render resources")
}

pub async fn print_function_resources(file: PathBuf, namespace: String) -> AnyResult<()> {
    println!("{}", render(file, &namespace).await?);
    Ok(())
}

pub async fn write_function_resources_to_file(
    file: PathBuf,
    namespace: String,
    output: PathBuf,
) -> AnyResult<()> {
    let resources = render(file, &namespace).await?;
    tokio::fs::write(output, resources)
        .await
        .context("Failed to write resources to file")?;
    Ok(())
}
