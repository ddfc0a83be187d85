//! The rights-gated IPC shortcut composing the capability table, the IPC
//! engine, and the scheduler for the hot path "send on a capability"
//! (spec §4.F).

use parking_lot::Mutex;
use tracing::instrument;

use crate::cap::{CapRights, ObjectKind};
use crate::error::Status;
use crate::ipc::{self, Message};
use crate::process::{ProcessKernel, ThreadId};
use crate::sched::Scheduler;

pub type PagerHook = dyn Fn(ThreadId, u64, u32) -> Status + Send + Sync;

pub struct Fastpath {
    pager: Mutex<Option<Box<PagerHook>>>,
}

impl Fastpath {
    pub fn new() -> Self {
        Self {
            pager: Mutex::new(None),
        }
    }

    pub fn register_pager(&self, hook: Box<PagerHook>) {
        *self.pager.lock() = Some(hook);
    }

    /// 1. Resolve the sender's capability table. 2. `lookup(cap, SEND)`.
    /// 3. Attempt the send; on `MailboxFull`, enqueue the sender on the
    /// destination's blocked FIFO and deschedule it, returning `Pending`.
    #[instrument(skip(self, process_kernel, scheduler, msg))]
    pub fn send(
        &self,
        process_kernel: &ProcessKernel,
        scheduler: &Scheduler,
        sender: ThreadId,
        cap: u32,
        msg: Message,
    ) -> Status {
        let receiver = {
            let threads = process_kernel.threads();
            let sender_thread = match threads.get(sender) {
                Some(t) => t,
                None => return Status::NotInitialized,
            };
            let lookup = sender_thread.caps.lock().lookup(cap, CapRights::SEND);
            match lookup {
                Some((ObjectKind::Thread, object)) => ThreadId(object as u32),
                _ => return Status::AccessDenied,
            }
        };

        let sent = ipc::send(&process_kernel.threads(), receiver, msg);
        match sent {
            Ok(()) => Status::Success,
            Err(_mailbox_full) => {
                {
                    let threads = process_kernel.threads();
                    if let Some(receiver_thread) = threads.get(receiver) {
                        receiver_thread.mailbox.lock().enqueue_blocked(sender);
                    }
                }
                let mut threads = process_kernel.threads();
                scheduler.block_current(&mut threads, sender);
                Status::Pending
            }
        }
    }

    pub fn handle_page_fault(&self, thread: ThreadId, address: u64, flags: u32) -> Status {
        match self.pager.lock().as_ref() {
            Some(hook) => hook(thread, address, flags),
            None => Status::NotImplemented,
        }
    }
}

impl Default for Fastpath {
    fn default() -> Self {
        Self::new()
    }
}
