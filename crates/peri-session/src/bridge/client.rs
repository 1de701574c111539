//! Interactive bridge for the initiator
//!
//! Puts the local terminal in raw mode, forwards stdin bytes as payload,
//! and writes inbound payload to stdout. The prior terminal mode is
//! restored on every exit path via a drop guard.

use std::io::Write;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::session::{CloseReason, PeerSession};

use super::shutdown_signal;

/// Size of one stdin read.
const STDIN_READ_BUFFER: usize = 1024;

/// Restores the terminal to its prior mode on drop.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode().context("failed to enter raw terminal mode")?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

/// Relay the local terminal over the session until it ends. Returns the
/// close reason.
pub async fn run_interactive(mut session: PeerSession) -> Result<CloseReason> {
    let mut payloads = session
        .take_payloads()
        .context("payload stream already taken")?;
    let mut monitor = session.monitor();

    let _raw = RawModeGuard::enable()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut stdin = tokio::io::stdin();
    let mut buf = vec![0u8; STDIN_READ_BUFFER];
    let mut stdin_open = true;

    let reason = loop {
        tokio::select! {
            reason = monitor.closed() => break reason,

            _ = &mut shutdown => {
                session.close(CloseReason::LocalSignal);
                break CloseReason::LocalSignal;
            }

            read = stdin.read(&mut buf), if stdin_open => match read {
                Ok(0) => {
                    // Local stdin is gone; remote output may still flow.
                    stdin_open = false;
                }
                Ok(n) => {
                    if session.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break CloseReason::SendFailed;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stdin read failed");
                    stdin_open = false;
                }
            },

            payload = payloads.recv() => match payload {
                Some(data) => {
                    let mut stdout = std::io::stdout().lock();
                    stdout
                        .write_all(&data)
                        .context("failed to write terminal output")?;
                    stdout.flush().context("failed to flush terminal output")?;
                }
                None => break monitor.closed().await,
            },
        }
    };

    Ok(reason)
}
