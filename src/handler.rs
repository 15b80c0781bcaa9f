use std::sync::Mutex;

use serenity::{
    async_trait,
    model::prelude::{Ready, ResumedEvent},
    prelude::{Context, EventHandler},
};
use tokio::sync::oneshot;

/// What the gateway told us about ourselves when the session became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReadyInfo {
    pub(crate) user: String,
    pub(crate) guilds: usize,
}

/// Reports the first `ready` event back to whoever is waiting on the
/// handshake. Later `ready` events (new sessions after an invalidation) are
/// only logged.
pub(crate) struct Handler {
    ready: Mutex<Option<oneshot::Sender<ReadyInfo>>>,
}

impl Handler {
    pub(crate) fn new(ready: oneshot::Sender<ReadyInfo>) -> Self {
        Self {
            ready: Mutex::new(Some(ready)),
        }
    }

    /// Hands `info` to the waiting handshake. `false` if it was already
    /// signalled or nobody is waiting anymore.
    fn signal_ready(&self, info: ReadyInfo) -> bool {
        let sender = self.ready.lock().ok().and_then(|mut slot| slot.take());
        match sender {
            Some(sender) => sender.send(info).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(
            guilds = ready.guilds.len(),
            "{} is connected!",
            ready.user.name
        );

        let info = ReadyInfo {
            user: ready.user.name.clone(),
            guilds: ready.guilds.len(),
        };
        if !self.signal_ready(info) {
            tracing::debug!("Gateway session re-identified");
        }
    }

    async fn resume(&self, _ctx: Context, _resumed: ResumedEvent) {
        tracing::info!("Gateway session resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ReadyInfo {
        ReadyInfo {
            user: "gateway-bot".into(),
            guilds: 2,
        }
    }

    #[test]
    fn first_ready_reaches_the_handshake() {
        let (tx, mut rx) = oneshot::channel();
        let handler = Handler::new(tx);

        assert!(handler.signal_ready(info()));
        assert_eq!(rx.try_recv().unwrap(), info());
    }

    #[test]
    fn later_ready_events_are_not_forwarded() {
        let (tx, _rx) = oneshot::channel();
        let handler = Handler::new(tx);

        assert!(handler.signal_ready(info()));
        assert!(!handler.signal_ready(info()));
    }

    #[test]
    fn abandoned_handshake_is_not_an_error() {
        let (tx, rx) = oneshot::channel();
        let handler = Handler::new(tx);
        drop(rx);

        assert!(!handler.signal_ready(info()));
    }
}
