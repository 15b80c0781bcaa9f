//! The one gateway session this process owns, and the bootstrapper that
//! establishes it.
//!
//! ```text
//! Unstarted ──handshake ok──▶ Connected ──stop──▶ Stopping ──▶ Stopped
//!     │  ▲                        │
//!     │  └─transient, retry       └─connection lost──▶ Failed
//!     ├─rejected / retries spent──▶ Failed
//!     └─shutdown signal──────────▶ Stopped
//! ```

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    backoff,
    config::{Configuration, Token},
    error::BotError,
    gateway::{Connection, Gateway, GatewayError},
    shutdown::ShutdownListener,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SessionState {
    Unstarted,
    Connected,
    Failed,
    Stopping,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unstarted => "unstarted",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Status {
    pub(crate) state: SessionState,
    pub(crate) connected_since: Option<DateTime<Utc>>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: SessionState::Unstarted,
            connected_since: None,
        }
    }
}

/// Establishes the session. `start` consumes it, so a process can only ever
/// get one session out of it.
pub(crate) struct Bootstrapper<G> {
    gateway: G,
    status: watch::Sender<Status>,
}

impl<G: Gateway> Bootstrapper<G> {
    pub(crate) fn new(gateway: G) -> Self {
        let (status, _) = watch::channel(Status::default());
        Self { gateway, status }
    }

    /// Follows the session state, before and after `start`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Authenticates with the gateway, retrying transient failures with
    /// backoff.
    ///
    /// Returns a `Connected` session, or a `Stopped` one when `shutdown` fires
    /// before the handshake completes. A rejected credential is never retried.
    pub(crate) async fn start(
        self,
        config: &Configuration,
        shutdown: &mut ShutdownListener,
    ) -> Result<Session<G::Connection>, BotError> {
        let mut session = Session {
            state: SessionState::Unstarted,
            token: config.token().clone(),
            connection: None,
            connected_since: None,
            status: self.status,
            shutdown_timeout: config.shutdown_timeout(),
        };
        let policy = config.retry();
        let mut retries = 0;

        loop {
            tracing::info!(attempt = retries + 1, "Connecting to the gateway");

            let outcome = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                outcome = self.gateway.authenticate(&session.token) => Some(outcome),
            };

            let reason = match outcome {
                None => {
                    tracing::info!("Shutdown requested during the gateway handshake");
                    session.set_state(SessionState::Stopped);
                    return Ok(session);
                }
                Some(Ok(connection)) => {
                    session.connection = Some(connection);
                    session.connected_since = Some(Utc::now());
                    session.set_state(SessionState::Connected);
                    tracing::info!("Gateway session established");
                    return Ok(session);
                }
                Some(Err(GatewayError::Rejected(reason))) => {
                    session.set_state(SessionState::Failed);
                    return Err(BotError::Authentication(reason));
                }
                Some(Err(GatewayError::Unreachable(reason))) => reason,
            };

            if retries >= policy.max_retries {
                session.set_state(SessionState::Failed);
                return Err(BotError::Connection {
                    attempts: retries + 1,
                    reason,
                });
            }
            retries += 1;

            let delay = backoff::delay_for(&policy, retries);
            tracing::warn!(
                retry = retries,
                max_retries = policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Gateway handshake failed: {}",
                reason
            );

            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested while waiting to reconnect");
                    session.set_state(SessionState::Stopped);
                    return Ok(session);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// The authenticated session. Only [`Session::stop`] changes it once it is
/// `Connected`.
pub(crate) struct Session<C: Connection> {
    state: SessionState,
    token: Token,
    connection: Option<C>,
    connected_since: Option<DateTime<Utc>>,
    status: watch::Sender<Status>,
    shutdown_timeout: Duration,
}

impl<C: Connection> Session<C> {
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// The live connection. `None` unless the session is `Connected`.
    pub(crate) fn connection(&self) -> Option<&C> {
        match self.state {
            SessionState::Connected => self.connection.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.connected_since
    }

    /// Resolves if the connection ends on its own, marking the session
    /// `Failed`. Never resolves for a session that is not `Connected`.
    /// Cancel safe.
    pub(crate) async fn closed(&mut self) -> BotError {
        let reason = match (self.state, self.connection.as_mut()) {
            (SessionState::Connected, Some(connection)) => connection.closed().await,
            _ => std::future::pending().await,
        };

        self.connection = None;
        self.set_state(SessionState::Failed);
        BotError::ConnectionLost(reason.to_string())
    }

    /// Releases the connection and waits, up to the configured shutdown
    /// timeout, for the gateway client to confirm. Does nothing unless the
    /// session is `Connected`.
    pub(crate) async fn stop(&mut self) {
        if self.state != SessionState::Connected {
            return;
        }

        self.set_state(SessionState::Stopping);
        if let Some(mut connection) = self.connection.take().filter(|c| c.is_open()) {
            if tokio::time::timeout(self.shutdown_timeout, connection.close())
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "Gateway client did not shut down in time, aborting it"
                );
                connection.abort();
            }
        }
        self.set_state(SessionState::Stopped);
        tracing::info!("Gateway session stopped");
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        tracing::debug!(%state, "Session state changed");
        self.status.send_replace(Status {
            state,
            connected_since: match state {
                SessionState::Connected => self.connected_since,
                _ => None,
            },
        });
    }
}

/// Starts the session, then holds it until `shutdown` fires or the connection
/// is lost, and always stops it before returning.
///
/// `Ok` only once the session is no longer `Connected`.
pub(crate) async fn serve<G: Gateway>(
    bootstrapper: Bootstrapper<G>,
    config: &Configuration,
    shutdown: &mut ShutdownListener,
) -> Result<(), BotError> {
    let mut session = bootstrapper.start(config, shutdown).await?;
    if session.connection().is_some() {
        tracing::info!("Serving until shutdown");
    }

    let outcome = tokio::select! {
        _ = shutdown.recv() => Ok(()),
        err = session.closed() => Err(err),
    };

    let connected_since = session.connected_since();
    session.stop().await;

    if let Some(since) = connected_since {
        tracing::info!(
            state = %session.state(),
            uptime_secs = (Utc::now() - since).num_seconds(),
            "Gateway session ended"
        );
    }

    outcome
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("token", &self.token)
            .field("connected_since", &self.connected_since)
            .finish()
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.as_mut() {
            tracing::warn!("Session dropped without being stopped, releasing its connection");
            connection.abort();
        }
    }
}
