//! Connection task: owns the WebSocket and the reconnect loop.
//!
//! The task never interprets messages. It forwards every text frame as a
//! [`TransportEvent::Message`] in arrival order and writes whatever the
//! session queued on the outbound channel. After a disconnect it waits
//! with exponential backoff plus jitter and tries again, up to the
//! configured retry cap.

// Rust guideline compliant 2026-02

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::constants::{
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RECONNECT_ATTEMPTS, RECONNECT_JITTER_MS,
};
use crate::error::TransportError;
use crate::ws::{self, WsMessage};

/// Largest frame or message accepted from the backend.
///
/// The catalog arrives as one frame that can run to tens of megabytes.
const MAX_INBOUND_BYTES: usize = 256 << 20;

/// What happened on the wire, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection attempt is about to start after `delay`.
    Connecting {
        /// 0 for the first connect, then the reconnection attempt number.
        attempt: u32,
        /// Backoff before the attempt.
        delay: Duration,
    },
    /// The handshake completed.
    Open,
    /// A text frame arrived.
    Message(String),
    /// A frame of an unsupported kind arrived and was dropped.
    Unexpected(&'static str),
    /// The peer closed the connection or the stream ended.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// The socket failed.
    Error(String),
    /// The retry cap was reached; the task has stopped.
    GaveUp {
        /// Reconnection attempts made.
        attempts: u32,
    },
}

/// Reconnection behaviour after the connection drops.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Whether to reconnect at all.
    pub enabled: bool,
    /// Delay before the first reconnection attempt.
    pub initial_backoff_ms: u64,
    /// Ceiling for the doubling delay.
    pub max_backoff_ms: u64,
    /// Reconnection attempts before giving up.
    pub max_retries: u32,
    /// Upper bound of random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            max_retries: MAX_RECONNECT_ATTEMPTS,
            jitter_ms: RECONNECT_JITTER_MS,
        }
    }
}

impl ReconnectPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Whether reconnection attempt `attempt` (1-based) may run.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.enabled && attempt <= self.max_retries
    }

    /// Backoff before attempt `attempt`, without jitter.
    ///
    /// `initial * 2^(attempt-1)`, capped at `max_backoff_ms`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Backoff before attempt `attempt`, with jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (self.jitter_ms + 1)
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }
}

/// The session's end of a connection: queue frames, request shutdown.
///
/// Dropping the handle shuts the connection task down.
#[derive(Debug)]
pub struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
}

/// The connection task's end of a [`ConnectionHandle`].
#[derive(Debug)]
pub struct ConnectionEndpoint {
    /// Frames queued by the session.
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Flips to `true` on shutdown.
    pub shutdown: watch::Receiver<bool>,
}

impl ConnectionHandle {
    /// Create a linked handle/endpoint pair without spawning anything.
    #[must_use]
    pub fn channel() -> (Self, ConnectionEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                outbound: outbound_tx,
                shutdown: shutdown_tx,
            },
            ConnectionEndpoint {
                outbound: outbound_rx,
                shutdown: shutdown_rx,
            },
        )
    }

    /// Spawn the connection task for `url` on the current tokio runtime.
    ///
    /// Returns the handle and the stream of wire events.
    #[must_use]
    pub fn spawn(
        url: &str,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (handle, endpoint) = Self::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_connection_loop(
            url.to_string(),
            policy,
            endpoint,
            events_tx,
        ));
        (handle, events_rx)
    }

    /// Queue a text frame.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::ConnectionLost)
    }

    /// Ask the connection task to close the socket and stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// How the inner message loop ended.
enum LoopExit {
    /// Shutdown was requested or the session went away.
    Shutdown,
    /// The connection was lost; reconnect if allowed.
    Disconnected,
}

/// Connect, pump frames, reconnect with backoff until shut down or out of
/// retries.
pub async fn run_connection_loop(
    url: String,
    policy: ReconnectPolicy,
    mut endpoint: ConnectionEndpoint,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut attempt: u32 = 0;
    let _ = events.send(TransportEvent::Connecting {
        attempt,
        delay: Duration::ZERO,
    });

    loop {
        if *endpoint.shutdown.borrow() {
            break;
        }

        // Frames queued while no socket was open belong to a dead connection.
        let mut stale = 0usize;
        while endpoint.outbound.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::warn!("[Transport] Dropped {} frame(s) queued while disconnected", stale);
        }

        log::info!("[Transport] Connecting to {}", url);

        let connected = tokio::select! {
            result = connect(&url) => Some(result),
            _ = endpoint.shutdown.changed() => None,
        };
        let Some(result) = connected else {
            break;
        };

        match result {
            Ok((mut writer, mut reader)) => {
                log::info!("[Transport] Connected to {}", url);
                attempt = 0;

                if events.send(TransportEvent::Open).is_err() {
                    let _ = writer.close().await;
                    break;
                }

                let exit = run_message_loop(&mut writer, &mut reader, &mut endpoint, &events).await;
                if let LoopExit::Shutdown = exit {
                    log::info!("[Transport] Shutdown requested, closing connection");
                    flush_outbound(&mut writer, &mut endpoint.outbound).await;
                    let _ = writer.close().await;
                    break;
                }
            }
            Err(e) => {
                log::warn!("[Transport] Connection failed: {:#}", e);
                if events.send(TransportEvent::Error(format!("{e:#}"))).is_err() {
                    break;
                }
            }
        }

        attempt += 1;
        if !policy.allows(attempt) {
            if policy.enabled {
                log::error!(
                    "[Transport] Giving up after {} reconnection attempt(s)",
                    policy.max_retries
                );
                let _ = events.send(TransportEvent::GaveUp {
                    attempts: policy.max_retries,
                });
            }
            break;
        }

        let delay = policy.delay(attempt);
        log::info!(
            "[Transport] Reconnecting in {:.1}s (attempt {}/{})",
            delay.as_secs_f32(),
            attempt,
            policy.max_retries
        );
        if events
            .send(TransportEvent::Connecting { attempt, delay })
            .is_err()
        {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = endpoint.shutdown.changed() => {
                log::info!("[Transport] Shutdown during reconnect backoff");
                break;
            }
        }
    }

    log::debug!("[Transport] Connection task finished");
}

async fn connect(url: &str) -> Result<(ws::WsWriter, ws::WsReader), TransportError> {
    ws::connect(url, MAX_INBOUND_BYTES)
        .await
        .map_err(|e| TransportError::Connect(format!("{e:#}")))
}

/// Write frames the session queued before it shut down.
async fn flush_outbound(writer: &mut ws::WsWriter, outbound: &mut mpsc::UnboundedReceiver<String>) {
    while let Ok(text) = outbound.try_recv() {
        if let Err(e) = writer.send_text(text).await {
            log::warn!("[Transport] Dropping queued frames on shutdown: {:#}", e);
            break;
        }
    }
}

/// Pump one live connection until it drops or shutdown is requested.
async fn run_message_loop(
    writer: &mut ws::WsWriter,
    reader: &mut ws::WsReader,
    endpoint: &mut ConnectionEndpoint,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> LoopExit {
    loop {
        tokio::select! {
            frame = reader.recv() => {
                let event = match frame {
                    Some(Ok(WsMessage::Text(text))) => TransportEvent::Message(text),
                    Some(Ok(WsMessage::Binary(_))) => TransportEvent::Unexpected("binary"),
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = writer.send_pong(data).await;
                        continue;
                    }
                    Some(Ok(WsMessage::Close { code, reason })) => {
                        log::info!("[Transport] Connection closed by server ({})", code);
                        let _ = events.send(TransportEvent::Closed { code, reason });
                        return LoopExit::Disconnected;
                    }
                    Some(Err(e)) => {
                        log::warn!("[Transport] WebSocket error: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        return LoopExit::Disconnected;
                    }
                    None => {
                        log::info!("[Transport] WebSocket stream ended");
                        let _ = events.send(TransportEvent::Closed {
                            code: 1006,
                            reason: "stream ended".to_string(),
                        });
                        return LoopExit::Disconnected;
                    }
                };
                if events.send(event).is_err() {
                    return LoopExit::Shutdown;
                }
            }

            outgoing = endpoint.outbound.recv() => {
                let Some(text) = outgoing else {
                    return LoopExit::Shutdown;
                };
                if let Err(e) = writer.send_text(text).await {
                    log::warn!("[Transport] Send failed: {:#}", e);
                    let _ = events.send(TransportEvent::Error(format!("{e:#}")));
                    return LoopExit::Disconnected;
                }
            }

            _ = endpoint.shutdown.changed() => return LoopExit::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
            max_retries: 5,
            jitter_ms: 0,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.base_delay(1), Duration::from_secs(1));
        assert_eq!(p.base_delay(2), Duration::from_secs(2));
        assert_eq!(p.base_delay(3), Duration::from_secs(4));
        assert_eq!(p.base_delay(4), Duration::from_secs(8));
        assert_eq!(p.base_delay(5), Duration::from_secs(10));
        assert_eq!(p.base_delay(60), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let p = ReconnectPolicy {
            jitter_ms: 250,
            ..policy()
        };
        for _ in 0..100 {
            let d = p.delay(2);
            assert!(d >= Duration::from_millis(2_000));
            assert!(d <= Duration::from_millis(2_250));
        }
    }

    #[test]
    fn test_retry_cap() {
        let p = policy();
        assert!(p.allows(1));
        assert!(p.allows(5));
        assert!(!p.allows(6));
        assert!(!ReconnectPolicy::disabled().allows(1));
    }

    #[test]
    fn test_handle_send_after_endpoint_dropped() {
        let (handle, endpoint) = ConnectionHandle::channel();
        drop(endpoint);
        assert_eq!(
            handle.send("{}".to_string()),
            Err(TransportError::ConnectionLost)
        );
    }

    #[test]
    fn test_dropping_handle_signals_shutdown() {
        let (handle, endpoint) = ConnectionHandle::channel();
        assert!(!*endpoint.shutdown.borrow());
        drop(handle);
        assert!(*endpoint.shutdown.borrow());
    }

    #[tokio::test]
    async fn test_unreachable_server_gives_up() {
        let (handle, endpoint) = ConnectionHandle::channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let p = ReconnectPolicy {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            max_retries: 2,
            ..policy()
        };

        // Port 9 (discard) on loopback is closed on any sane test host.
        run_connection_loop("ws://127.0.0.1:9/ws".to_string(), p, endpoint, events_tx).await;
        drop(handle);

        let mut seen = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            seen.push(event);
        }
        let errors = seen
            .iter()
            .filter(|e| matches!(e, TransportEvent::Error(_)))
            .count();
        assert_eq!(errors, 3);
        assert_eq!(seen.last(), Some(&TransportEvent::GaveUp { attempts: 2 }));
    }
}
