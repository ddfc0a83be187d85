//! Composition root (spec §4.F/§9): wires the hive, the process/thread
//! kernel, the scheduler, the IPC fastpath, and the registry façade into a
//! single handle. Individual components stay independently testable; this
//! is where their cross-component call sequences — "drain a mailbox, then
//! ready whichever sender was blocked on it" — actually happen.

use std::sync::Arc;

use tracing::instrument;

use crate::cap::CapRights;
use crate::collaborators::{ArchOps, HalOps, HeapMem, MemOps, NullArch, NullHal};
use crate::config::KernelConfig;
use crate::error::{ProcError, Status};
use crate::fastpath::Fastpath;
use crate::hive::Hive;
use crate::ipc::{self, Message};
use crate::process::{Priority, ProcessId, ProcessKernel, ThreadId};
use crate::registry::Registry;
use crate::sched::Scheduler;

pub struct Kernel {
    pub config: KernelConfig,
    pub hive: Arc<Hive>,
    pub registry: Registry,
    pub processes: ProcessKernel,
    pub scheduler: Scheduler,
    pub fastpath: Fastpath,
    hal: Box<dyn HalOps>,
}

impl Kernel {
    /// Hosted configuration: `NullArch`/`HeapMem`/`NullHal` collaborators,
    /// a fresh in-memory hive sized per `config.default_hive_size`.
    pub fn new(config: KernelConfig) -> Self {
        Self::with_collaborators(config, Box::new(NullArch), Box::new(HeapMem::default()), Box::new(NullHal))
    }

    pub fn with_collaborators(
        config: KernelConfig,
        arch: Box<dyn ArchOps>,
        mem: Box<dyn MemOps>,
        hal: Box<dyn HalOps>,
    ) -> Self {
        let hive = Arc::new(Hive::create(config.default_hive_size));
        let registry = Registry::new(hive.clone());
        let processes = ProcessKernel::new(config.clone(), arch, mem);
        Self {
            config,
            hive,
            registry,
            processes,
            scheduler: Scheduler::new(),
            fastpath: Fastpath::new(),
            hal,
        }
    }

    pub fn boot(&self) {
        self.hal.timer_enable(self.hal.timer_period_ms());
        self.hal.interrupts_enable();
    }

    #[instrument(skip(self))]
    pub fn create_process(&self, name: &str) -> Result<ProcessId, ProcError> {
        self.processes.create_process(name)
    }

    /// Create a thread and immediately hand it to the scheduler's ready
    /// queue (spec §4.D creates `Initialized`; §4.E's `ready` is the only
    /// way out of that state).
    #[instrument(skip(self, entry, arg))]
    pub fn spawn_thread(
        &self,
        pid: ProcessId,
        entry: usize,
        arg: usize,
        priority: Priority,
    ) -> Result<ThreadId, ProcError> {
        let tid = self.processes.create_thread(pid, entry, arg, priority)?;
        let mut threads = self.processes.threads();
        // A fresh thread table slot always exists right after creation.
        self.scheduler.ready(&mut threads, tid).expect("just-created thread id is valid");
        Ok(tid)
    }

    #[instrument(skip(self))]
    pub fn terminate_thread(&self, tid: ThreadId, exit_code: i32) -> Result<(), ProcError> {
        self.scheduler.cancel_sleep(tid);
        self.processes.terminate_thread(tid, exit_code)
    }

    #[instrument(skip(self))]
    pub fn terminate_process(&self, pid: ProcessId, exit_code: i32) -> Result<(), ProcError> {
        self.processes.terminate_process(pid, exit_code)
    }

    /// Resolve `cap` against `sender`'s own table and attempt delivery; on
    /// `MailboxFull` the sender blocks and this returns `Status::Pending`.
    #[instrument(skip(self, msg))]
    pub fn send(&self, sender: ThreadId, cap: u32, msg: Message) -> Status {
        self.fastpath.send(&self.processes, &self.scheduler, sender, cap, msg)
    }

    /// Drain `receiver`'s mailbox slot and, if that freed a spot for a
    /// blocked sender, ready it (the sender must call `send` again itself —
    /// the queued message bytes are not resurrected, see SPEC_FULL.md §9).
    #[instrument(skip(self, out))]
    pub fn receive(&self, receiver: ThreadId, out: &mut Message) -> Status {
        let outcome = {
            let threads = self.processes.threads();
            ipc::receive(&threads, receiver, out)
        };
        match outcome {
            Ok(()) => {
                let woken = {
                    let threads = self.processes.threads();
                    ipc::post_receive(&threads, receiver)
                };
                if let Ok(Some(sender)) = woken {
                    let mut threads = self.processes.threads();
                    let _ = self.scheduler.ready(&mut threads, sender);
                }
                Status::Success
            }
            Err(e) => e.into(),
        }
    }

    /// Create a self-send/receive capability pair's target thread lookup is
    /// out of scope here; this grants `cap` on `grantor`'s table to the
    /// object `target` with `rights`, for composing IPC topologies in tests.
    pub fn grant_capability(&self, grantor: ThreadId, rights: CapRights, target: ThreadId) -> Result<u32, Status> {
        let threads = self.processes.threads();
        let thread = threads.get(grantor).ok_or(Status::NotFound)?;
        thread
            .caps
            .lock()
            .insert(crate::cap::ObjectKind::Thread, rights, target.0 as u64)
            .map_err(Status::from)
    }

    pub fn timer_tick(&self) {
        let mut threads = self.processes.threads();
        self.scheduler.timer_tick(&mut threads);
    }

    pub fn yield_now(&self, tid: ThreadId) {
        let mut threads = self.processes.threads();
        if self.scheduler.current() == Some(tid) {
            self.scheduler.yield_now(&mut threads);
        }
    }

    pub fn sleep(&self, tid: ThreadId, duration_ms: u64) -> Result<(), Status> {
        let mut threads = self.processes.threads();
        self.scheduler
            .sleep(&mut threads, tid, duration_ms)
            .map_err(Status::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ThreadState;

    fn boot_kernel() -> Kernel {
        Kernel::new(KernelConfig::default())
    }

    #[test]
    fn spawning_a_thread_makes_it_the_current_thread() {
        let kernel = boot_kernel();
        let pid = kernel.create_process("init").unwrap();
        let tid = kernel.spawn_thread(pid, 0, 0, Priority::Normal).unwrap();
        assert_eq!(kernel.scheduler.current(), Some(tid));
    }

    #[test]
    fn blocked_send_wakes_on_receive() {
        let kernel = boot_kernel();
        let pid = kernel.create_process("init").unwrap();
        let sender = kernel.spawn_thread(pid, 0, 0, Priority::Normal).unwrap();
        let receiver = kernel.spawn_thread(pid, 0, 0, Priority::Normal).unwrap();

        let cap = kernel.grant_capability(sender, CapRights::SEND, receiver).unwrap();

        assert_eq!(kernel.send(sender, cap, Message::from_slice(&[1])), Status::Success);
        // Mailbox already full: this send blocks the sender.
        assert_eq!(kernel.send(sender, cap, Message::from_slice(&[2])), Status::Pending);
        {
            let threads = kernel.processes.threads();
            assert_eq!(threads.get(sender).unwrap().state, ThreadState::Waiting);
        }

        let mut out = Message::default();
        assert_eq!(kernel.receive(receiver, &mut out), Status::Success);
        assert_eq!(out.as_slice(), &[1]);

        let threads = kernel.processes.threads();
        assert_eq!(threads.get(sender).unwrap().state, ThreadState::Ready);
    }

    #[test]
    fn terminate_process_tears_down_every_thread() {
        let kernel = boot_kernel();
        let pid = kernel.create_process("init").unwrap();
        let a = kernel.spawn_thread(pid, 0, 0, Priority::Normal).unwrap();
        let b = kernel.spawn_thread(pid, 0, 0, Priority::Normal).unwrap();
        kernel.terminate_process(pid, 0).unwrap();

        let threads = kernel.processes.threads();
        assert_eq!(threads.get(a).unwrap().state, ThreadState::Terminated);
        assert_eq!(threads.get(b).unwrap().state, ThreadState::Terminated);
    }

    #[test]
    fn registry_survives_across_process_lifecycle() {
        let kernel = boot_kernel();
        let key = kernel.registry.create_key(r"NTCore\Boot").unwrap();
        kernel
            .registry
            .set_value(key, "Stage", crate::registry::Value::Dword(1))
            .unwrap();

        let pid = kernel.create_process("init").unwrap();
        kernel.terminate_process(pid, 0).unwrap();

        assert_eq!(
            kernel.registry.get_value(key, "Stage").unwrap(),
            Some(crate::registry::Value::Dword(1))
        );
    }
}
