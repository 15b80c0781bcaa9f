//! Process-wide shutdown signal.
//!
//! SIGINT/SIGTERM → [`Shutdown::trigger`] → every [`ShutdownListener`] wakes.
//! Backed by a `watch` channel so a listener created after the trigger still
//! sees it.

use tokio::sync::watch;

pub(crate) struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub(crate) fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Triggers once SIGINT (Ctrl+C) or, on unix, SIGTERM arrives.
    pub(crate) async fn trigger_on_signal(&self) {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received");
        self.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub(crate) struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolves once shutdown has been triggered. Returns immediately if it
    /// already was. Cancel safe.
    pub(crate) async fn recv(&mut self) {
        // the sender lives as long as main, a closed channel means it is gone
        // and nothing can trigger anymore, so treat it as a shutdown too
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
