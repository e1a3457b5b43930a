//! Operator stop signal
//!
//! Wraps the broadcast shutdown receiver so every phase of a run observes
//! the same stop. Once a signal has been seen it stays set. A closed
//! channel only means nobody can stop the run any more.

use tokio::sync::broadcast;
use tokio::time::Instant;

/// Sticky view of a broadcast shutdown channel
pub struct StopSignal {
    receiver: broadcast::Receiver<()>,
    listening: bool,
    stopped: bool,
}

impl StopSignal {
    pub fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self {
            receiver,
            listening: true,
            stopped: false,
        }
    }

    /// True once a stop signal has been observed
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Resolve when a stop signal arrives; never resolves after the channel closed
    ///
    /// Cancel safe, so it can sit in a `select!` next to other work.
    pub async fn recv(&mut self) {
        while !self.stopped && self.listening {
            match self.receiver.recv().await {
                Err(broadcast::error::RecvError::Closed) => self.listening = false,
                // A lagged receiver still means somebody asked to stop
                _ => self.stopped = true,
            }
        }
        if !self.stopped {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep until `deadline`; returns true if a stop signal came first
    pub async fn interrupted_before(&mut self, deadline: Instant) -> bool {
        tokio::select! {
            biased;
            _ = self.recv() => true,
            _ = tokio::time::sleep_until(deadline) => false,
        }
    }
}

impl From<broadcast::Receiver<()>> for StopSignal {
    fn from(receiver: broadcast::Receiver<()>) -> Self {
        Self::new(receiver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_signal_is_sticky() {
        let (tx, rx) = broadcast::channel(1);
        let mut stop = StopSignal::new(rx);
        tx.send(()).unwrap();

        assert!(stop.interrupted_before(Instant::now() + Duration::from_secs(10)).await);
        assert!(stop.is_stopped());
        // No second message needed
        assert!(stop.interrupted_before(Instant::now() + Duration::from_secs(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_waits_out_deadline() {
        let (tx, rx) = broadcast::channel::<()>(1);
        drop(tx);
        let mut stop = StopSignal::new(rx);

        let start = Instant::now();
        assert!(!stop.interrupted_before(start + Duration::from_secs(5)).await);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(!stop.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_cuts_sleep_short() {
        let (tx, rx) = broadcast::channel(1);
        let mut stop = StopSignal::new(rx);
        let start = Instant::now();

        let send = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(()).unwrap();
        };
        let (interrupted, _) = tokio::join!(
            stop.interrupted_before(start + Duration::from_secs(300)),
            send
        );

        assert!(interrupted);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
