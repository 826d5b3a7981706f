// src/mailbox.rs
//! Per-process mailboxes: three bounded FIFO queues plus a stop signal.
//!
//! The sending half lives in the process table and is never handed out to
//! other components; the receiving half is owned by the behaviour loop.

use crate::term::Term;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Default capacity for each queue.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Something delivered to a process.
#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    /// Plain payload without sender attribution.
    Direct(Term),
    /// Payload that carries its provenance.
    From { sender: Term, payload: Term },
    /// Runtime-internal signal.
    Control(Term),
}

/// Why an enqueue did not happen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity (non-blocking sends only).
    Full,
    /// The receiving process is gone.
    Closed,
}

impl<T> From<mpsc::error::SendError<T>> for QueueError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        QueueError::Closed
    }
}

impl<T> From<mpsc::error::TrySendError<T>> for QueueError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        }
    }
}

/// Sender half of a mailbox.
#[derive(Clone)]
pub struct MailboxSender {
    direct: mpsc::Sender<Term>,
    attributed: mpsc::Sender<(Term, Term)>,
    control: mpsc::Sender<Term>,
    stop: Arc<watch::Sender<bool>>,
}

/// Receiver half of a mailbox.
pub struct Mailbox {
    direct: mpsc::Receiver<Term>,
    attributed: mpsc::Receiver<(Term, Term)>,
    control: mpsc::Receiver<Term>,
    stop: watch::Receiver<bool>,
}

/// Create a mailbox whose direct and attributed queues hold `mailbox_size`
/// messages each and whose control queue holds `control_size`.
///
/// Both sizes are clamped to at least 1.
pub fn channel(mailbox_size: usize, control_size: usize) -> (MailboxSender, Mailbox) {
    let (tx_direct, rx_direct) = mpsc::channel(mailbox_size.max(1));
    let (tx_from, rx_from) = mpsc::channel(mailbox_size.max(1));
    let (tx_ctl, rx_ctl) = mpsc::channel(control_size.max(1));
    let (tx_stop, rx_stop) = watch::channel(false);
    (
        MailboxSender {
            direct: tx_direct,
            attributed: tx_from,
            control: tx_ctl,
            stop: Arc::new(tx_stop),
        },
        Mailbox {
            direct: rx_direct,
            attributed: rx_from,
            control: rx_ctl,
            stop: rx_stop,
        },
    )
}

impl MailboxSender {
    /// Enqueue on the direct queue, waiting while it is full.
    pub async fn send_direct(&self, payload: Term) -> Result<(), QueueError> {
        Ok(self.direct.send(payload).await?)
    }

    /// Enqueue `(sender, payload)` on the attributed queue, waiting while it
    /// is full.
    pub async fn send_from(&self, sender: Term, payload: Term) -> Result<(), QueueError> {
        Ok(self.attributed.send((sender, payload)).await?)
    }

    pub async fn send_control(&self, signal: Term) -> Result<(), QueueError> {
        Ok(self.control.send(signal).await?)
    }

    pub fn try_send_direct(&self, payload: Term) -> Result<(), QueueError> {
        Ok(self.direct.try_send(payload)?)
    }

    pub fn try_send_from(&self, sender: Term, payload: Term) -> Result<(), QueueError> {
        Ok(self.attributed.try_send((sender, payload))?)
    }

    pub fn try_send_control(&self, signal: Term) -> Result<(), QueueError> {
        Ok(self.control.try_send(signal)?)
    }

    /// Tell the owning loop to stop. Messages still queued are discarded
    /// by the receiver.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Number of messages waiting on the direct queue.
    pub fn direct_len(&self) -> usize {
        self.direct.max_capacity() - self.direct.capacity()
    }

    /// Number of messages waiting on the attributed queue.
    pub fn attributed_len(&self) -> usize {
        self.attributed.max_capacity() - self.attributed.capacity()
    }

    /// `true` once the receiving half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.direct.is_closed()
    }
}

impl Mailbox {
    /// `true` once the process has been told to stop.
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Await the next message from any queue. Control signals are preferred
    /// over attributed messages, which are preferred over direct ones.
    ///
    /// Returns `None` once the process has been told to stop, or when every
    /// queue is closed and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        if self.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            Ok(()) = self.stop.changed() => None,
            Some(signal) = self.control.recv() => Some(Envelope::Control(signal)),
            Some((sender, payload)) = self.attributed.recv() => {
                Some(Envelope::From { sender, payload })
            }
            Some(payload) = self.direct.recv() => Some(Envelope::Direct(payload)),
            else => None,
        }
    }

    /// Await the next plain payload.
    pub async fn recv_direct(&mut self) -> Option<Term> {
        if self.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            Ok(()) = self.stop.changed() => None,
            payload = self.direct.recv() => payload,
        }
    }

    /// Await the next `(sender, payload)` pair.
    pub async fn recv_from(&mut self) -> Option<(Term, Term)> {
        if self.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            Ok(()) = self.stop.changed() => None,
            pair = self.attributed.recv() => pair,
        }
    }

    pub async fn recv_control(&mut self) -> Option<Term> {
        if self.is_stopped() {
            return None;
        }
        tokio::select! {
            biased;
            Ok(()) = self.stop.changed() => None,
            signal = self.control.recv() => signal,
        }
    }

    pub fn try_recv_direct(&mut self) -> Option<Term> {
        if self.is_stopped() {
            return None;
        }
        self.direct.try_recv().ok()
    }

    pub fn try_recv_from(&mut self) -> Option<(Term, Term)> {
        if self.is_stopped() {
            return None;
        }
        self.attributed.try_recv().ok()
    }

    pub fn try_recv_control(&mut self) -> Option<Term> {
        if self.is_stopped() {
            return None;
        }
        self.control.try_recv().ok()
    }

    /// Resolves once the process has been told to stop or its sender is gone.
    pub async fn stopped(&mut self) {
        while !self.is_stopped() {
            if self.stop.changed().await.is_err() {
                return;
            }
        }
    }
}
