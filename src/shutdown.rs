use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wait for SIGINT or SIGTERM, then cancel the active batch.
///
/// Cancellation is cooperative: queued tasks skip, in-flight tasks drain
/// to their own outcome before the summary is reported.
pub async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling batch...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling batch...");
        }
    }

    cancel.cancel();
}
