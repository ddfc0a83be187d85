//! Five-level priority round-robin scheduler (spec §4.E).

mod queue;
mod timer;

pub use queue::ReadyQueues;
pub use timer::TimerWheel;

use parking_lot::Mutex;
use tracing::instrument;

use crate::process::{Priority, ThreadState, ThreadTable};
use crate::error::SchedError;

/// Quanta per time-slice. Not config-driven: spec names the 10ms tick
/// period but never a slice-length knob, so this is an internal constant.
const DEFAULT_TIME_SLICE: u32 = 4;

struct SchedInner {
    ready: ReadyQueues,
    current: Option<crate::process::ThreadId>,
    wheel: TimerWheel,
    clock_ms: u64,
}

/// Owns the ready queues, the current-thread pointer, and the timer wheel
/// under a single lock (spec §3: "the scheduler ready queues under the
/// scheduler lock"). Every public method takes the thread table it must
/// read/mutate thread state in.
pub struct Scheduler {
    inner: Mutex<SchedInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SchedInner {
                ready: ReadyQueues::new(),
                current: None,
                wheel: TimerWheel::new(),
                clock_ms: 0,
            }),
        }
    }

    pub fn current(&self) -> Option<crate::process::ThreadId> {
        self.inner.lock().current
    }

    /// Transition `tid` from `Initialized`/`Waiting` to `Ready` and enqueue
    /// it, then re-run the scheduling decision (a newly ready thread may
    /// preempt the current one if its priority is strictly higher).
    #[instrument(skip(self, threads))]
    pub fn ready(&self, threads: &mut ThreadTable, tid: crate::process::ThreadId) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        let thread = threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
        if thread.state == ThreadState::Terminated {
            return Ok(());
        }
        thread.state = ThreadState::Ready;
        thread.time_slice = DEFAULT_TIME_SLICE;
        inner.ready.push_back(thread.priority, tid);
        self.schedule_locked(&mut inner, threads);
        Ok(())
    }

    /// Transition the current thread to `Waiting` without enqueueing it
    /// (the caller has already recorded why it's blocked), then pick a new
    /// current thread.
    #[instrument(skip(self, threads))]
    pub fn block_current(&self, threads: &mut ThreadTable, tid: crate::process::ThreadId) {
        let mut inner = self.inner.lock();
        if let Some(t) = threads.get_mut(tid) {
            t.state = ThreadState::Waiting;
        }
        if inner.current == Some(tid) {
            inner.current = None;
        }
        self.schedule_locked(&mut inner, threads);
    }

    #[instrument(skip(self, threads))]
    pub fn sleep(
        &self,
        threads: &mut ThreadTable,
        tid: crate::process::ThreadId,
        duration_ms: u64,
    ) -> Result<(), SchedError> {
        let mut inner = self.inner.lock();
        let deadline = inner.clock_ms + duration_ms;
        {
            let thread = threads.get_mut(tid).ok_or(SchedError::NoSuchThread)?;
            thread.state = ThreadState::Waiting;
            thread.wakeup_deadline_ms = Some(deadline);
        }
        inner.wheel.schedule(deadline, tid);
        if inner.current == Some(tid) {
            inner.current = None;
        }
        self.schedule_locked(&mut inner, threads);
        Ok(())
    }

    #[instrument(skip(self, threads))]
    pub fn yield_now(&self, threads: &mut ThreadTable) {
        let mut inner = self.inner.lock();
        if let Some(cur) = inner.current {
            if let Some(t) = threads.get_mut(cur) {
                t.time_slice = 0;
            }
        }
        self.schedule_locked(&mut inner, threads);
    }

    /// Decrement the current thread's slice, wake any expired sleepers,
    /// then re-run the scheduling decision. Called once per HAL timer
    /// period (10 ms for priorities below realtime, per spec §4.E).
    #[instrument(skip(self, threads))]
    pub fn timer_tick(&self, threads: &mut ThreadTable) {
        let mut inner = self.inner.lock();
        inner.clock_ms += 1;

        let expired = inner.wheel.drain_expired(inner.clock_ms);
        for tid in expired {
            if let Some(t) = threads.get_mut(tid) {
                if t.state == ThreadState::Waiting {
                    t.state = ThreadState::Ready;
                    t.wakeup_deadline_ms = None;
                    t.time_slice = DEFAULT_TIME_SLICE;
                    inner.ready.push_back(t.priority, tid);
                }
            }
        }

        if let Some(cur) = inner.current {
            if let Some(t) = threads.get_mut(cur) {
                if t.state == ThreadState::Running && t.time_slice > 0 {
                    t.time_slice -= 1;
                }
            }
        }

        self.schedule_locked(&mut inner, threads);
    }

    /// Remove a blocked sender's wakeup from the timer wheel (e.g. it was
    /// terminated while sleeping); O(n) over the wheel, matching the
    /// blocked-sender FIFO cancellation cost (spec §5).
    pub fn cancel_sleep(&self, tid: crate::process::ThreadId) {
        self.inner.lock().wheel.cancel(tid);
    }

    /// Core decision: if the current thread is actually running, only a
    /// strictly-higher-priority ready thread preempts it; a same-priority
    /// ready thread only preempts once the current thread's slice is
    /// exhausted. Otherwise (blocked, terminated, or no current thread)
    /// the highest non-empty queue overall is picked.
    fn schedule_locked(&self, inner: &mut SchedInner, threads: &mut ThreadTable) -> Option<crate::process::ThreadId> {
        let running = inner
            .current
            .filter(|&c| threads.get(c).map(|t| t.state == ThreadState::Running).unwrap_or(false));

        if let Some(cur) = running {
            let cur_priority = threads.get(cur).unwrap().priority;

            if let Some(next) = inner.ready.pop_highest_above(cur_priority) {
                Self::demote(&mut inner.ready, threads, cur, cur_priority);
                Self::promote(threads, next);
                inner.current = Some(next);
                return inner.current;
            }

            let exhausted = threads.get(cur).map(|t| t.time_slice == 0).unwrap_or(true);
            if exhausted {
                if let Some(next) = inner.ready.pop_front(cur_priority) {
                    Self::demote(&mut inner.ready, threads, cur, cur_priority);
                    Self::promote(threads, next);
                    inner.current = Some(next);
                    return inner.current;
                }
                if let Some(t) = threads.get_mut(cur) {
                    t.time_slice = DEFAULT_TIME_SLICE;
                }
            }
            return Some(cur);
        }

        match inner.ready.pop_highest() {
            Some(next) => {
                Self::promote(threads, next);
                inner.current = Some(next);
                inner.current
            }
            None => {
                inner.current = None;
                None
            }
        }
    }

    fn demote(ready: &mut ReadyQueues, threads: &mut ThreadTable, tid: crate::process::ThreadId, priority: Priority) {
        if let Some(t) = threads.get_mut(tid) {
            t.state = ThreadState::Ready;
            t.time_slice = DEFAULT_TIME_SLICE;
        }
        ready.push_back(priority, tid);
    }

    fn promote(threads: &mut ThreadTable, tid: crate::process::ThreadId) {
        if let Some(t) = threads.get_mut(tid) {
            t.state = ThreadState::Running;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ArchContext, HeapMem, MemOps};
    use crate::process::ThreadTable;

    fn spawn(threads: &mut ThreadTable, priority: Priority) -> crate::process::ThreadId {
        let mem = HeapMem::default();
        let stack = mem.alloc(4096).unwrap();
        threads
            .insert(|id| {
                crate::process::Thread::new(
                    id,
                    crate::process::ProcessId(0),
                    priority,
                    stack,
                    ArchContext::default(),
                    4,
                )
            })
            .unwrap()
    }

    #[test]
    fn higher_priority_preempts_immediately() {
        let mut threads = ThreadTable::new(16);
        let sched = Scheduler::new();
        let normal = spawn(&mut threads, Priority::Normal);
        sched.ready(&mut threads, normal).unwrap();
        assert_eq!(sched.current(), Some(normal));

        let realtime = spawn(&mut threads, Priority::Realtime);
        sched.ready(&mut threads, realtime).unwrap();
        assert_eq!(sched.current(), Some(realtime));
        assert_eq!(threads.get(normal).unwrap().state, ThreadState::Ready);
    }

    #[test]
    fn same_priority_round_robins_only_after_exhaustion() {
        let mut threads = ThreadTable::new(16);
        let sched = Scheduler::new();
        let a = spawn(&mut threads, Priority::Normal);
        sched.ready(&mut threads, a).unwrap();
        let b = spawn(&mut threads, Priority::Normal);
        sched.ready(&mut threads, b).unwrap();
        // `b` must not preempt `a` at equal priority before `a`'s slice runs out.
        assert_eq!(sched.current(), Some(a));

        for _ in 0..DEFAULT_TIME_SLICE {
            sched.timer_tick(&mut threads);
        }
        assert_eq!(sched.current(), Some(b));
    }

    #[test]
    fn sleep_wakes_after_the_deadline_elapses() {
        let mut threads = ThreadTable::new(16);
        let sched = Scheduler::new();
        let a = spawn(&mut threads, Priority::Normal);
        sched.ready(&mut threads, a).unwrap();
        sched.sleep(&mut threads, a, 3).unwrap();
        assert_eq!(threads.get(a).unwrap().state, ThreadState::Waiting);

        sched.timer_tick(&mut threads);
        sched.timer_tick(&mut threads);
        assert_eq!(threads.get(a).unwrap().state, ThreadState::Waiting);
        sched.timer_tick(&mut threads);
        assert_eq!(threads.get(a).unwrap().state, ThreadState::Running);
    }
}
