//! Fixed-slot process and thread tables: table indices stand in for raw
//! pointers, replacing the source's circular ownership (spec §9).

use crate::error::ProcError;

use super::process::{Process, ProcessId};
use super::thread::{Thread, ThreadId};

enum Slot<T> {
    Free,
    Used(Box<T>),
}

impl<T> Slot<T> {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

pub struct ProcessTable {
    entries: Vec<Slot<Process>>,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || Slot::Free);
        Self { entries }
    }

    pub fn insert(&mut self, build: impl FnOnce(ProcessId) -> Process) -> Result<ProcessId, ProcError> {
        let idx = self
            .entries
            .iter()
            .position(Slot::is_free)
            .ok_or(ProcError::NoProcessSlot)?;
        let id = ProcessId(idx as u32);
        self.entries[idx] = Slot::Used(Box::new(build(id)));
        Ok(id)
    }

    pub fn get(&self, id: ProcessId) -> Option<&Process> {
        match self.entries.get(id.0 as usize)? {
            Slot::Used(p) => Some(p),
            Slot::Free => None,
        }
    }

    pub fn get_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        match self.entries.get_mut(id.0 as usize)? {
            Slot::Used(p) => Some(p),
            Slot::Free => None,
        }
    }

    pub fn remove(&mut self, id: ProcessId) -> Result<Process, ProcError> {
        let slot = self
            .entries
            .get_mut(id.0 as usize)
            .ok_or(ProcError::NoSuchProcess)?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Used(p) => Ok(*p),
            Slot::Free => Err(ProcError::NoSuchProcess),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.iter().filter(|s| !s.is_free()).count()
    }
}

pub struct ThreadTable {
    entries: Vec<Slot<Thread>>,
}

impl ThreadTable {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || Slot::Free);
        Self { entries }
    }

    pub fn insert(&mut self, build: impl FnOnce(ThreadId) -> Thread) -> Result<ThreadId, ProcError> {
        let idx = self
            .entries
            .iter()
            .position(Slot::is_free)
            .ok_or(ProcError::NoThreadSlot)?;
        let id = ThreadId(idx as u32);
        self.entries[idx] = Slot::Used(Box::new(build(id)));
        Ok(id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        match self.entries.get(id.0 as usize)? {
            Slot::Used(t) => Some(t),
            Slot::Free => None,
        }
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        match self.entries.get_mut(id.0 as usize)? {
            Slot::Used(t) => Some(t),
            Slot::Free => None,
        }
    }

    pub fn remove(&mut self, id: ThreadId) -> Result<Thread, ProcError> {
        let slot = self
            .entries
            .get_mut(id.0 as usize)
            .ok_or(ProcError::NoSuchThread)?;
        match std::mem::replace(slot, Slot::Free) {
            Slot::Used(t) => Ok(*t),
            Slot::Free => Err(ProcError::NoSuchThread),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.iter().filter(|s| !s.is_free()).count()
    }

    /// Threads currently in state `Terminated`, whose slots `reap` will
    /// free. Table slot reclamation is asynchronous from termination
    /// itself (spec §3 lifecycle note).
    pub fn terminated_ids(&self) -> Vec<ThreadId> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Slot::Used(t) if t.state == super::thread::ThreadState::Terminated => {
                    Some(ThreadId(i as u32))
                }
                _ => None,
            })
            .collect()
    }
}
