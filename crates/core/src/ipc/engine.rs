//! Register-only send/receive/post_receive over a thread table (spec §4.C).
//!
//! These functions only move bytes and FIFO entries; they do not touch
//! scheduler state. Blocking a sender on `MailboxFull` and readying a
//! woken sender are decisions made by the fastpath (§4.F) and the kernel
//! facade, which have access to the scheduler — IPC only depends on B and D.

use tracing::instrument;

use super::message::Message;
use crate::error::IpcError;
use crate::process::table::ThreadTable;
use crate::process::thread::ThreadId;

#[instrument(skip(threads, msg), fields(receiver = receiver.0))]
pub fn send(threads: &ThreadTable, receiver: ThreadId, msg: Message) -> Result<(), IpcError> {
    let thread = threads.get(receiver).ok_or(IpcError::NotFound)?;
    thread.mailbox.lock().try_deliver(msg)
}

#[instrument(skip(threads, out), fields(receiver = receiver.0))]
pub fn receive(threads: &ThreadTable, receiver: ThreadId, out: &mut Message) -> Result<(), IpcError> {
    let thread = threads.get(receiver).ok_or(IpcError::NotFound)?;
    let msg = thread.mailbox.lock().take().ok_or(IpcError::Empty)?;
    *out = msg;
    Ok(())
}

/// Dequeues one blocked sender, if any, and returns its id for the caller
/// to ready via the scheduler.
#[instrument(skip(threads), fields(receiver = receiver.0))]
pub fn post_receive(threads: &ThreadTable, receiver: ThreadId) -> Result<Option<ThreadId>, IpcError> {
    let thread = threads.get(receiver).ok_or(IpcError::NotFound)?;
    Ok(thread.mailbox.lock().dequeue_blocked())
}
