use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Returns a token that fires on ctrl-c. Every long-running task in the
/// process selects on a clone of it for graceful shutdown.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl+C handler");
        tc.cancel();
    });
    token
}
