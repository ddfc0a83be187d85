//! Process/thread kernel (spec §4.D): fixed-slot tables, lifecycle,
//! context-initialization contract.

pub mod process;
pub mod table;
pub mod thread;

pub use process::{Process, ProcessId, ProcessState};
pub use table::{ProcessTable, ThreadTable};
pub use thread::{Priority, Thread, ThreadId, ThreadState};

use parking_lot::Mutex;
use tracing::instrument;

use crate::cap::{CapRights, ObjectKind};
use crate::collaborators::{ArchOps, MemOps};
use crate::config::KernelConfig;
use crate::error::ProcError;

/// Composes the process and thread tables with the memory/arch
/// collaborators to implement create/terminate lifecycle operations.
pub struct ProcessKernel {
    processes: Mutex<ProcessTable>,
    threads: Mutex<ThreadTable>,
    arch: Box<dyn ArchOps>,
    mem: Box<dyn MemOps>,
    config: KernelConfig,
}

impl ProcessKernel {
    pub fn new(config: KernelConfig, arch: Box<dyn ArchOps>, mem: Box<dyn MemOps>) -> Self {
        Self {
            processes: Mutex::new(ProcessTable::new(config.max_processes)),
            threads: Mutex::new(ThreadTable::new(config.max_threads)),
            arch,
            mem,
            config,
        }
    }

    pub fn threads(&self) -> parking_lot::MutexGuard<'_, ThreadTable> {
        self.threads.lock()
    }

    pub fn processes(&self) -> parking_lot::MutexGuard<'_, ProcessTable> {
        self.processes.lock()
    }

    #[instrument(skip(self))]
    pub fn create_process(&self, name: &str) -> Result<ProcessId, ProcError> {
        let address_space = self.mem.new_address_space();
        let mut processes = self.processes.lock();
        processes.insert(|id| Process::new(id, name.to_string(), address_space))
    }

    #[instrument(skip(self, entry, arg))]
    pub fn create_thread(
        &self,
        pid: ProcessId,
        entry: usize,
        arg: usize,
        priority: Priority,
    ) -> Result<ThreadId, ProcError> {
        let mut processes = self.processes.lock();
        let process = processes.get_mut(pid).ok_or(ProcError::NoSuchProcess)?;
        if process.thread_count as usize >= self.config.max_threads_per_process {
            return Err(ProcError::ThreadQuotaExceeded);
        }

        let stack = self
            .mem
            .alloc(self.config.kernel_stack_size)
            .ok_or(ProcError::NoMemory)?;
        let stack_top = stack.len();
        let context = self.arch.init_thread_context(stack_top, entry, arg);

        let mut threads = self.threads.lock();
        let tid = threads.insert(|id| {
            Thread::new(id, pid, priority, stack, context, self.config.cap_table_size)
        })?;

        {
            let thread = threads.get_mut(tid).expect("just inserted");
            thread
                .caps
                .get_mut()
                .insert(ObjectKind::Thread, CapRights::SEND | CapRights::RECV, tid.0 as u64)
                .expect("fresh capability table has free slots");
        }

        if let Some(old_head) = process.thread_head {
            if let Some(old_head_thread) = threads.get_mut(old_head) {
                old_head_thread.prev = Some(tid);
            }
        }
        if let Some(new_thread) = threads.get_mut(tid) {
            new_thread.next = process.thread_head;
        }
        process.thread_head = Some(tid);
        if process.main_thread.is_none() {
            process.main_thread = Some(tid);
        }
        process.thread_count += 1;

        Ok(tid)
    }

    #[instrument(skip(self))]
    pub fn terminate_thread(&self, tid: ThreadId, exit_code: i32) -> Result<(), ProcError> {
        let mut processes = self.processes.lock();
        let mut threads = self.threads.lock();
        let pid = threads.get(tid).ok_or(ProcError::NoSuchThread)?.pid;
        Self::terminate_thread_locked(&mut processes, &mut threads, pid, tid, exit_code)
    }

    fn terminate_thread_locked(
        processes: &mut ProcessTable,
        threads: &mut ThreadTable,
        pid: ProcessId,
        tid: ThreadId,
        exit_code: i32,
    ) -> Result<(), ProcError> {
        let (prev, next) = {
            let thread = threads.get_mut(tid).ok_or(ProcError::NoSuchThread)?;
            thread.state = ThreadState::Terminated;
            thread.exit_code = Some(exit_code);
            thread.kernel_stack = Vec::new();
            *thread.caps.get_mut() = crate::cap::CapTable::new(0);
            (thread.prev, thread.next)
        };

        if let Some(p) = prev {
            if let Some(pt) = threads.get_mut(p) {
                pt.next = next;
            }
        }
        if let Some(n) = next {
            if let Some(nt) = threads.get_mut(n) {
                nt.prev = prev;
            }
        }

        if let Some(process) = processes.get_mut(pid) {
            if process.thread_head == Some(tid) {
                process.thread_head = next;
            }
            process.thread_count = process.thread_count.saturating_sub(1);
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub fn terminate_process(&self, pid: ProcessId, exit_code: i32) -> Result<(), ProcError> {
        let mut processes = self.processes.lock();
        let mut threads = self.threads.lock();

        let mut cursor = processes.get(pid).ok_or(ProcError::NoSuchProcess)?.thread_head;
        while let Some(tid) = cursor {
            cursor = threads.get(tid).and_then(|t| t.next);
            Self::terminate_thread_locked(&mut processes, &mut threads, pid, tid, exit_code)?;
        }

        let process = processes.get_mut(pid).ok_or(ProcError::NoSuchProcess)?;
        process.state = ProcessState::Terminated;
        process.exit_code = Some(exit_code);
        Ok(())
    }

    /// Frees the table slot of every thread in state `Terminated`. Table
    /// slot reclamation is asynchronous from termination itself (spec §3).
    pub fn reap_terminated_threads(&self) -> usize {
        let mut threads = self.threads.lock();
        let ids = threads.terminated_ids();
        for id in &ids {
            let _ = threads.remove(*id);
        }
        ids.len()
    }
}
