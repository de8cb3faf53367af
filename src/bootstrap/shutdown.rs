use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Process-wide shutdown signal.
///
/// Triggering it tells every listener to stop accepting and every
/// connection driver to cancel its in-flight operation, which in turn
/// lets each completion queue drain to closure.
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(false);
        Arc::new(Self { tx })
    }

    /// Begin teardown. Idempotent.
    pub fn trigger(&self) {
        if !*self.tx.borrow() {
            info!("shutdown triggered");
        }
        let _ = self.tx.send(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        assert!(!shutdown.is_triggered());
        shutdown.trigger();
        shutdown.trigger();

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
        assert!(shutdown.is_triggered());
    }
}
