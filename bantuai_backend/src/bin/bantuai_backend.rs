use anyhow::{Context, Result};
use bantuai_backend::config::ConsoleConfig;
use bantuai_backend::runtime::BackendRuntime;
use bantuai_backend::server::serve_backend;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bantuai_backend=debug")),
        )
        .init();

    let config = ConsoleConfig::load();
    let runtime = BackendRuntime::bootstrap(config).context("failed to bootstrap backend runtime")?;

    tracing::info!(
        "Starting store service (set BANTUAI_BACKEND_TOKEN + optional BANTUAI_BACKEND_BIND; auth mode via BANTUAI_BACKEND_AUTH_MODE)"
    );

    let server_rt = tokio::runtime::Runtime::new().context("failed to start server runtime")?;
    server_rt.block_on(serve_backend(runtime))
}
