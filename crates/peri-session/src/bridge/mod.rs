//! Terminal bridges
//!
//! A bridge pumps bytes between the supervised session and a local
//! surface: the operator's terminal on the initiator side, a PTY-attached
//! shell on the responder side. Both run until a termination condition
//! fires and both restore local state on every exit path.

pub mod client;
pub mod device;

pub use client::run_interactive;
pub use device::{run_shell, ShellConfig};

/// Resolves when a termination signal (Ctrl-C or SIGTERM) reaches the
/// process.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("received Ctrl+C");
        }
        _ = terminate => {
            tracing::debug!("received SIGTERM");
        }
    }
}
