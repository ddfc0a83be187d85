//! Thread identity, state machine, and per-thread resources (spec §3).

use parking_lot::Mutex;

use crate::cap::CapTable;
use crate::collaborators::ArchContext;
use crate::ipc::Mailbox;

use super::process::ProcessId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Initialized,
    Ready,
    Running,
    Waiting,
    Terminated,
}

/// Ascending priority: `Idle < Low < Normal < High < Realtime`. Derive
/// order follows declaration order, so `Ord` already matches "higher
/// variant listed later = higher priority".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Idle,
    Low,
    Normal,
    High,
    Realtime,
}

impl Priority {
    pub const COUNT: usize = 5;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> [Priority; Priority::COUNT] {
        [
            Priority::Idle,
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Realtime,
        ]
    }
}

pub struct Thread {
    pub id: ThreadId,
    pub pid: ProcessId,
    pub state: ThreadState,
    pub priority: Priority,
    pub time_slice: u32,
    pub kernel_stack: Vec<u8>,
    pub context: ArchContext,
    pub caps: Mutex<CapTable>,
    pub mailbox: Mutex<Mailbox>,
    /// Intrusive doubly-linked list within the owning process's thread
    /// list, replacing circular `Box`-owned pointers with table indices
    /// (spec §9 redesign note).
    pub next: Option<ThreadId>,
    pub prev: Option<ThreadId>,
    pub wakeup_deadline_ms: Option<u64>,
    pub exit_code: Option<i32>,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        pid: ProcessId,
        priority: Priority,
        kernel_stack: Vec<u8>,
        context: ArchContext,
        cap_table_size: usize,
    ) -> Self {
        Self {
            id,
            pid,
            state: ThreadState::Initialized,
            priority,
            time_slice: 0,
            kernel_stack,
            context,
            caps: Mutex::new(CapTable::new(cap_table_size)),
            mailbox: Mutex::new(Mailbox::new()),
            next: None,
            prev: None,
            wakeup_deadline_ms: None,
            exit_code: None,
        }
    }
}
