use tokio::sync::watch;

/// Owner side of a process-wide stop signal.
///
/// Raising it is sticky: every token handed out before or after observes the
/// cancellation.
#[derive(Debug)]
pub struct CancellationSignal {
    tx: watch::Sender<bool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a [`CancellationSignal`]. Dropping the signal counts as
/// cancellation.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An Err means the sender is gone, which is treated the same way.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
