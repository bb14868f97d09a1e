use tokio::signal;

/// Resolves on the first of SIGINT or SIGTERM. A handler that fails to
/// install is logged and never fires.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, signal = "SIGINT", "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
        "SIGINT"
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, signal = "SIGTERM", "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
        "SIGTERM"
    };

    #[cfg(not(unix))]
    let terminate = async {
        std::future::pending::<()>().await;
        "SIGTERM"
    };

    let received = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };

    tracing::info!(signal = received, "Shutdown signal received, draining connections");
}
