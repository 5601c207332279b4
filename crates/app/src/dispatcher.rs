use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Creates a zero-capacity handoff between HTTP handlers and the control loop.
///
/// [`Handoff::send`] resolves only after the single [`HandoffReceiver`] has
/// taken the value, so a slow consumer holds the webhook response back.
pub fn handoff<T>() -> (Handoff<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (Handoff { tx }, HandoffReceiver { rx })
}

struct Envelope<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Producer side. Clones may send concurrently; sends are serialized in the
/// order the channel admits them.
pub struct Handoff<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Handoff<T> {
    /// Moves `value` to the consumer and waits until it has been received.
    pub async fn send(&self, value: T) -> Result<(), DispatchError> {
        let (taken, ack) = oneshot::channel();
        self.tx
            .send(Envelope { value, taken })
            .await
            .map_err(|_| DispatchError::Closed)?;
        ack.await.map_err(|_| DispatchError::Closed)
    }
}

/// Consumer side. Exactly one exists per handoff.
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Waits for the next value. Returns `None` once every sender is gone.
    ///
    /// Cancel safe: a value is only acknowledged after it has been taken.
    pub async fn recv(&mut self) -> Option<T> {
        let envelope = self.rx.recv().await?;
        Some(Self::accept(envelope))
    }

    /// Takes a value that is already waiting, without suspending.
    #[cfg(test)]
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok().map(Self::accept)
    }

    fn accept(envelope: Envelope<T>) -> T {
        let Envelope { value, taken } = envelope;
        // The sender may have given up waiting; the value is ours either way.
        let _ = taken.send(());
        value
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("control loop is no longer receiving")]
    Closed,
}
