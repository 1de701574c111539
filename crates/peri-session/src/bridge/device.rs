//! Shell bridge for the responder
//!
//! Spawns an interactive shell on a pseudo-terminal, pumps the shell's
//! output to the peer as payload, and writes inbound payload to the
//! shell's input. When the shell's output stream closes the bridge tells
//! the peer to terminate, waits out a short grace period so the message
//! can be delivered, then exits. The child process is killed and reaped on
//! every exit path.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use portable_pty::{native_pty_system, Child, CommandBuilder, PtyPair, PtySize};
use tokio::sync::mpsc;
use tokio::time;

use crate::session::{CloseReason, PeerSession};

use super::shutdown_signal;

/// Size of one PTY read.
const PTY_READ_BUFFER: usize = 4096;

/// Capacity of the shell-output queue between the blocking reader thread
/// and the bridge loop.
const SHELL_OUTPUT_CAPACITY: usize = 64;

/// How the responder spawns its shell.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Shell binary to run.
    pub program: String,
    /// Arguments passed to the shell.
    pub args: Vec<String>,
    /// How long to wait after sending terminate before tearing the
    /// session down.
    pub exit_grace: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            args: vec!["-l".to_string()],
            exit_grace: Duration::from_secs(5),
        }
    }
}

/// A shell process attached to a pseudo-terminal.
struct ShellProcess {
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output_rx: mpsc::Receiver<Vec<u8>>,
    // The pair keeps the master side alive for the whole session.
    _pty: PtyPair,
}

fn spawn_shell(config: &ShellConfig) -> Result<ShellProcess> {
    let pty = native_pty_system()
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .context("failed to open pty")?;

    let mut cmd = CommandBuilder::new(&config.program);
    cmd.args(&config.args);
    cmd.env("TERM", "xterm-256color");

    let child = pty
        .slave
        .spawn_command(cmd)
        .with_context(|| format!("failed to spawn shell: {}", config.program))?;
    tracing::info!(shell = %config.program, pid = ?child.process_id(), "shell spawned");

    let writer = pty.master.take_writer().context("failed to take pty writer")?;
    let mut reader = pty
        .master
        .try_clone_reader()
        .context("failed to clone pty reader")?;

    // Blocking reads live on their own thread; the channel closing is the
    // shell-exit signal for the bridge loop.
    let (output_tx, output_rx) = mpsc::channel(SHELL_OUTPUT_CAPACITY);
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; PTY_READ_BUFFER];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok(ShellProcess {
        child,
        writer,
        output_rx,
        _pty: pty,
    })
}

/// Run the shell bridge until the session ends. Returns the close reason.
pub async fn run_shell(mut session: PeerSession, config: &ShellConfig) -> Result<CloseReason> {
    let mut shell = spawn_shell(config)?;
    let payloads = session
        .take_payloads()
        .context("payload stream already taken")?;

    let reason = bridge_loop(
        &session,
        payloads,
        &mut *shell.writer,
        &mut shell.output_rx,
        config.exit_grace,
    )
    .await;

    // The shell must not outlive the session.
    if let Err(err) = shell.child.kill() {
        tracing::debug!(error = %err, "shell kill failed");
    }
    let _ = shell.child.wait();

    Ok(reason)
}

/// Core relay loop, factored over plain handles so tests can drive it
/// without a real PTY.
async fn bridge_loop(
    session: &PeerSession,
    mut payloads: mpsc::Receiver<Bytes>,
    shell_input: &mut (dyn Write + Send),
    shell_output: &mut mpsc::Receiver<Vec<u8>>,
    exit_grace: Duration,
) -> CloseReason {
    let mut monitor = session.monitor();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            reason = monitor.closed() => return reason,

            _ = &mut shutdown => {
                session.close(CloseReason::LocalSignal);
                return CloseReason::LocalSignal;
            }

            output = shell_output.recv() => match output {
                Some(data) => {
                    if session.send(Bytes::from(data)).await.is_err() {
                        return CloseReason::SendFailed;
                    }
                }
                None => {
                    // Shell exited. Tell the peer, and hold the channel up
                    // long enough for the message to arrive.
                    tracing::info!("shell exited, terminating session");
                    session.send_terminate().await;
                    time::sleep(exit_grace).await;
                    session.close(CloseReason::LocalSignal);
                    return CloseReason::LocalSignal;
                }
            },

            payload = payloads.recv() => match payload {
                Some(data) => {
                    if let Err(err) = shell_input
                        .write_all(&data)
                        .and_then(|()| shell_input.flush())
                    {
                        tracing::warn!(error = %err, "shell input write failed");
                    }
                }
                None => return monitor.closed().await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use peri_protocol::control;

    use crate::channel::{ChannelError, ChannelEvent, PeerChannel};
    use crate::session::SessionTiming;

    #[derive(Default)]
    struct MockChannel {
        controls: Mutex<Vec<String>>,
        payloads: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl PeerChannel for MockChannel {
        async fn send_payload(&self, data: Bytes) -> Result<(), ChannelError> {
            self.payloads.lock().unwrap().push(data);
            Ok(())
        }

        async fn send_control(&self, text: &str) -> Result<(), ChannelError> {
            self.controls.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    async fn open_session(channel: Arc<MockChannel>) -> (PeerSession, mpsc::Sender<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        events_tx.send(ChannelEvent::Open).await.unwrap();
        let session = PeerSession::establish(channel, events_rx, SessionTiming::default())
            .await
            .unwrap();
        (session, events_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_exit_sends_terminate_and_waits_grace() {
        let channel = Arc::new(MockChannel::default());
        let (mut session, events_tx) = open_session(Arc::clone(&channel)).await;
        let payloads = session.take_payloads().unwrap();

        let (output_tx, mut output_rx) = mpsc::channel::<Vec<u8>>(4);
        let mut shell_input = std::io::sink();

        // Keep the watchdog fed and close the shell output immediately.
        events_tx
            .send(ChannelEvent::Text(control::KEEP_ALIVE.to_string()))
            .await
            .unwrap();
        drop(output_tx);

        let started = Instant::now();
        let reason = bridge_loop(
            &session,
            payloads,
            &mut shell_input,
            &mut output_rx,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(reason, CloseReason::LocalSignal);
        assert!(started.elapsed() >= Duration::from_secs(5));
        // Terminate goes out before the grace wait; heartbeats may follow.
        let controls = channel.controls.lock().unwrap();
        assert_eq!(controls.first().map(String::as_str), Some(control::TERMINATE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shell_output_flows_to_peer_and_input_to_shell() {
        let channel = Arc::new(MockChannel::default());
        let (mut session, events_tx) = open_session(Arc::clone(&channel)).await;
        let payloads = session.take_payloads().unwrap();

        let (output_tx, mut output_rx) = mpsc::channel::<Vec<u8>>(4);
        let mut shell_input: Vec<u8> = Vec::new();

        output_tx.send(b"prompt$ ".to_vec()).await.unwrap();
        events_tx
            .send(ChannelEvent::Binary(Bytes::from_static(b"ls\n")))
            .await
            .unwrap();

        // End the session from the peer side once traffic has flowed.
        let events_tx_task = events_tx.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(1)).await;
            let _ = events_tx_task
                .send(ChannelEvent::Text(control::TERMINATE.to_string()))
                .await;
        });

        let reason = bridge_loop(
            &session,
            payloads,
            &mut shell_input,
            &mut output_rx,
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(reason, CloseReason::PeerRequestedTermination);
        assert_eq!(
            channel.payloads.lock().unwrap().as_slice(),
            &[Bytes::from_static(b"prompt$ ")]
        );
        assert_eq!(shell_input, b"ls\n");
    }
}
