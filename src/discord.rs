//! Discord gateway client, via serenity.

use std::sync::Arc;

use serenity::{
    async_trait,
    client::bridge::gateway::ShardManager,
    gateway::GatewayError as ShardError,
    http::HttpError,
    prelude::{GatewayIntents, Mutex},
    Client,
};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    config::Token,
    gateway::{Connection, Gateway, GatewayError},
    handler::{Handler, ReadyInfo},
};

pub(crate) struct Discord {
    intents: GatewayIntents,
}

impl Discord {
    pub(crate) fn new() -> Self {
        Self {
            intents: GatewayIntents::GUILDS,
        }
    }
}

#[async_trait]
impl Gateway for Discord {
    type Connection = DiscordConnection;

    async fn authenticate(&self, token: &Token) -> Result<DiscordConnection, GatewayError> {
        let (ready_tx, mut ready_rx) = oneshot::channel();

        let mut client = Client::builder(token.expose(), self.intents)
            .event_handler(Handler::new(ready_tx))
            .await
            .map_err(classify)?;

        // dropping `connection` before the handshake finishes tears the client down
        let mut connection = DiscordConnection {
            shard_manager: client.shard_manager.clone(),
            runner: Some(tokio::spawn(async move { client.start().await })),
        };

        let handshake = tokio::select! {
            Ok(ready) = &mut ready_rx => Ok(ready),
            err = connection.closed() => Err(err),
        };

        let ready: ReadyInfo = handshake?;
        tracing::info!(
            bot = %ready.user,
            guilds = ready.guilds,
            "Gateway handshake complete"
        );
        Ok(connection)
    }
}

pub(crate) struct DiscordConnection {
    shard_manager: Arc<Mutex<ShardManager>>,
    runner: Option<JoinHandle<Result<(), serenity::Error>>>,
}

#[async_trait]
impl Connection for DiscordConnection {
    fn is_open(&self) -> bool {
        self.runner
            .as_ref()
            .is_some_and(|runner| !runner.is_finished())
    }

    async fn closed(&mut self) -> GatewayError {
        let Some(runner) = self.runner.as_mut() else {
            return GatewayError::Unreachable("gateway client is not running".to_string());
        };

        let outcome = runner.await;
        self.runner = None;

        match outcome {
            Ok(Ok(())) => GatewayError::Unreachable("gateway client stopped".to_string()),
            Ok(Err(err)) => classify(err),
            Err(err) => GatewayError::Unreachable(format!("gateway client task ended: {}", err)),
        }
    }

    async fn close(&mut self) {
        self.shard_manager.lock().await.shutdown_all().await;

        if let Some(runner) = self.runner.as_mut() {
            match runner.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("Gateway client exited with an error: {}", err),
                Err(err) => tracing::warn!("Gateway client task failed: {}", err),
            }
            self.runner = None;
        }
    }

    fn abort(&mut self) {
        if let Some(runner) = self.runner.take() {
            runner.abort();

            let shard_manager = self.shard_manager.clone();
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    shard_manager.lock().await.shutdown_all().await;
                });
            }
        }
    }
}

impl Drop for DiscordConnection {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Sorts serenity errors into "the credential is bad" and "try again".
fn classify(err: serenity::Error) -> GatewayError {
    let rejected = match &err {
        serenity::Error::Gateway(
            ShardError::InvalidAuthentication
            | ShardError::InvalidGatewayIntents
            | ShardError::DisallowedGatewayIntents,
        ) => true,
        serenity::Error::Http(http) => matches!(
            &**http,
            HttpError::UnsuccessfulRequest(response) if response.status_code.as_u16() == 401
        ),
        _ => false,
    };

    if rejected {
        GatewayError::Rejected(err.to_string())
    } else {
        GatewayError::Unreachable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_authentication_is_a_rejection() {
        let err = classify(serenity::Error::Gateway(ShardError::InvalidAuthentication));
        assert!(matches!(err, GatewayError::Rejected(_)), "{:?}", err);
    }

    #[test]
    fn disallowed_intents_are_a_rejection() {
        for shard_err in [
            ShardError::DisallowedGatewayIntents,
            ShardError::InvalidGatewayIntents,
        ] {
            let err = classify(serenity::Error::Gateway(shard_err));
            assert!(matches!(err, GatewayError::Rejected(_)), "{:?}", err);
        }
    }

    #[test]
    fn dropped_connections_are_retryable() {
        for source in [
            serenity::Error::Gateway(ShardError::ReconnectFailure),
            serenity::Error::Other("connection reset"),
        ] {
            let err = classify(source);
            assert!(matches!(err, GatewayError::Unreachable(_)), "{:?}", err);
        }
    }
}
