//! Single-slot, overwrite-on-write handoff between one producer and one consumer.
//!
//! Built on a capacity-1 crossbeam channel. The producer keeps its own
//! receiver handle so it can evict an unconsumed value before publishing,
//! which keeps `publish` non-blocking and guarantees the slot always holds
//! the newest value.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

pub fn mailbox<T>() -> (MailboxSender<T>, MailboxReceiver<T>) {
    let (tx, rx) = bounded(1);
    (
        MailboxSender {
            tx,
            evict: rx.clone(),
        },
        MailboxReceiver { rx },
    )
}

#[derive(Debug)]
pub struct MailboxSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
}

impl<T> MailboxSender<T> {
    /// Publish `value`, replacing anything not yet taken.
    /// Returns true if an older value was superseded.
    pub fn publish(&self, mut value: T) -> bool {
        let mut superseded = false;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return superseded,
                Err(TrySendError::Full(v)) => {
                    superseded |= self.evict.try_recv().is_ok();
                    value = v;
                }
                Err(TrySendError::Disconnected(_)) => return superseded,
            }
        }
    }
}

#[derive(Debug)]
pub struct MailboxReceiver<T> {
    rx: Receiver<T>,
}

impl<T> MailboxReceiver<T> {
    /// Take the latest value, if one arrived since the last take
    pub fn take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn has_new(&self) -> bool {
        !self.rx.is_empty()
    }
}
