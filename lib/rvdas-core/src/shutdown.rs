//! A cloneable, once-resolving shutdown signal, patterned on the
//! `cx.shutdown` future used by the teacher's mock sources
//! (`src/test_util/mock/sources/basic.rs`): every stage task holds a clone
//! and `tokio::select!`s against it so that a single cancellation
//! propagates to every reader and writer task in a Listener (spec.md §5).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::watch;

/// The sending half. Dropping it (or calling `shutdown`) resolves every
/// outstanding `ShutdownSignal` future exactly once.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The receiving half; implements `Future` so it can be used directly in
/// `tokio::select!`. Clone freely — every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires; useful in tests and for stages run
    /// outside a Listener (e.g. the single-logger CLI's top level).
    pub fn noop() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Future for ShutdownSignal {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if *self.rx.borrow() {
            return Poll::Ready(());
        }
        loop {
            match self.rx.has_changed() {
                Ok(true) => {
                    if *self.rx.borrow_and_update() {
                        return Poll::Ready(());
                    }
                }
                Ok(false) => break,
                Err(_) => return Poll::Ready(()),
            }
        }
        let fut = self.rx.changed();
        tokio::pin!(fut);
        match fut.poll(cx) {
            Poll::Ready(Ok(())) => {
                if *self.rx.borrow() {
                    Poll::Ready(())
                } else {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
            Poll::Ready(Err(_)) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_resolves_all_clones() {
        let (trigger, signal) = ShutdownTrigger::new();
        let a = signal.clone();
        let b = signal.clone();
        trigger.shutdown();
        a.await;
        b.await;
    }

    #[tokio::test]
    async fn noop_never_resolves_without_trigger() {
        let signal = ShutdownSignal::noop();
        let res = tokio::time::timeout(std::time::Duration::from_millis(20), signal).await;
        assert!(res.is_err());
    }
}
