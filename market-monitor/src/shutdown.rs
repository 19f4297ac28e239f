use tokio::sync::watch;

/// Creates a linked trigger/listener pair. Listeners are cheap to clone.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Process-wide stop signal observed by every long-running loop
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A listener that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is triggered. Pends forever if the trigger is
    /// dropped without firing.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_listeners() {
        let (trigger, shutdown) = channel();
        let mut a = shutdown.clone();
        let mut b = shutdown;

        assert!(!a.is_triggered());
        trigger.trigger();

        a.wait().await;
        b.wait().await;
        assert!(b.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_fire() {
        let mut shutdown = Shutdown::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), shutdown.wait()).await;
        assert!(fired.is_err());
    }
}
