use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is received.
#[cfg(unix)]
pub fn install_shutdown_handler() -> CancellationToken {
    use tokio::signal::unix::{SignalKind, signal};

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping the cluster");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping the cluster");
            }
        }

        token_clone.cancel();
    });

    token
}

/// Install a shutdown handler that listens for ctrl-c.
#[cfg(not(unix))]
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received ctrl-c, stopping the cluster");
                token_clone.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install ctrl-c handler"),
        }
    });

    token
}
