use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    signal::unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;

use brain::{
    brain::{Brain, BrainError, BrainResponse},
    cli::config_path_from_args,
    config::Config,
    logging::init_tracing,
    planner::ExecutionSpec,
    types::BrainRequest,
};

/// One stdin line: the spec to run and the request to run it for.
#[derive(Deserialize)]
struct DriverLine {
    #[serde(default)]
    spec: ExecutionSpec,
    request: BrainRequest,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let logging_guard = init_tracing(&config.logging).context("failed to initialize logging")?;

    let brain = Brain::from_config(&config).context("failed to assemble brain")?;

    let shutdown = CancellationToken::new();
    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        let signal_name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        tracing::warn!(target: "brain", signal = signal_name, "shutdown_requested");
        signal_token.cancel();
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<DriverLine>(line) {
            Ok(DriverLine { spec, request }) => {
                brain
                    .process_request_with_cancel(&spec, request, &shutdown)
                    .await
            }
            Err(err) => BrainResponse::from_error(
                &BrainError::Internal(format!("invalid request line: {err}")),
                0.0,
            ),
        };

        let mut encoded =
            serde_json::to_string(&response).context("failed to encode brain response")?;
        encoded.push('\n');
        stdout
            .write_all(encoded.as_bytes())
            .await
            .context("failed to write stdout")?;
        stdout.flush().await.context("failed to flush stdout")?;
    }

    let analytics = brain.analytics().await;
    tracing::info!(
        target: "brain",
        run_id = %logging_guard.run_id(),
        total_requests = analytics.total_requests,
        successful_requests = analytics.successful_requests,
        average_processing_time = analytics.average_processing_time,
        "brain_stopped"
    );
    Ok(())
}
