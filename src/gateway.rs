//! What the bootstrapper needs from a gateway client: authenticate, report
//! whether the connection is still up, and close it. The wire protocol behind
//! it belongs to the client library.

use serenity::async_trait;
use thiserror::Error;

use crate::config::Token;

/// Handshake and connection failures, sorted by whether retrying can help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub(crate) enum GatewayError {
    /// The gateway refused the credential (or what it grants).
    #[error("gateway rejected the credential: {0}")]
    Rejected(String),

    /// Network trouble or an unexpected close. Worth another try.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
}

#[async_trait]
pub(crate) trait Gateway: Send + Sync {
    type Connection: Connection + 'static;

    /// Performs the handshake. Resolves once the gateway reports the session
    /// ready, or fails.
    ///
    /// Dropping the returned future must tear down anything it started.
    async fn authenticate(&self, token: &Token) -> Result<Self::Connection, GatewayError>;
}

#[async_trait]
pub(crate) trait Connection: Send {
    fn is_open(&self) -> bool;

    /// Resolves when the connection ends without being asked to. Cancel safe.
    async fn closed(&mut self) -> GatewayError;

    /// Releases the connection and waits until the client confirms it.
    async fn close(&mut self);

    /// Releases the connection without waiting. Used when a session is dropped
    /// without being stopped.
    fn abort(&mut self);
}
