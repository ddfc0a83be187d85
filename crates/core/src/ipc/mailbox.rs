//! A thread's single-slot mailbox plus its blocked-sender FIFO (spec §3).
//!
//! Modeled after RT-Thread-style mailboxes with an explicit suspended-sender
//! list rather than a generic condvar: the FIFO holds only sender thread
//! ids, not their messages (see the blocked-sender open question in
//! SPEC_FULL.md §9 — the message is not retried on wake, matching the
//! inherited source behavior).

use std::collections::VecDeque;

use super::message::Message;
use crate::error::IpcError;
use crate::process::thread::ThreadId;

#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Option<Message>,
    blocked_senders: VecDeque<ThreadId>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }

    /// Copies `msg` into the slot if empty. Never overwrites.
    pub fn try_deliver(&mut self, msg: Message) -> Result<(), IpcError> {
        if self.slot.is_some() {
            return Err(IpcError::MailboxFull);
        }
        self.slot = Some(msg);
        Ok(())
    }

    pub fn take(&mut self) -> Option<Message> {
        self.slot.take()
    }

    pub fn enqueue_blocked(&mut self, sender: ThreadId) {
        self.blocked_senders.push_back(sender);
    }

    pub fn dequeue_blocked(&mut self) -> Option<ThreadId> {
        self.blocked_senders.pop_front()
    }

    /// Remove `sender` from the FIFO regardless of position (cancellation,
    /// e.g. because the sender is being terminated). O(n) over the FIFO.
    pub fn remove_blocked(&mut self, sender: ThreadId) -> bool {
        let before = self.blocked_senders.len();
        self.blocked_senders.retain(|&id| id != sender);
        self.blocked_senders.len() != before
    }

    pub fn blocked_len(&self) -> usize {
        self.blocked_senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_delivery_without_drain_is_full() {
        let mut mbox = Mailbox::new();
        mbox.try_deliver(Message::from_slice(&[1])).unwrap();
        assert_eq!(
            mbox.try_deliver(Message::from_slice(&[2])).unwrap_err(),
            IpcError::MailboxFull
        );
    }

    #[test]
    fn blocked_fifo_is_first_in_first_out() {
        let mut mbox = Mailbox::new();
        mbox.enqueue_blocked(ThreadId(1));
        mbox.enqueue_blocked(ThreadId(2));
        assert_eq!(mbox.dequeue_blocked(), Some(ThreadId(1)));
        assert_eq!(mbox.dequeue_blocked(), Some(ThreadId(2)));
        assert_eq!(mbox.dequeue_blocked(), None);
    }
}
