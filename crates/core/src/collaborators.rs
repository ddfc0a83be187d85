//! Declared interfaces to components explicitly out of scope for this
//! crate: architecture-specific register save/restore, the physical and
//! virtual memory manager, and the HAL. A real boot target implements
//! these against actual hardware; tests and the in-process `Kernel` use the
//! [`NullArch`]/[`HeapMem`]/[`NullHal`] doubles below.

/// Opaque architecture context block. The core never inspects its
/// contents; only `ArchOps` implementations do.
#[derive(Debug, Clone, Default)]
pub struct ArchContext(pub Vec<u8>);

/// A contiguous range of pages returned by [`MemOps::alloc_pages`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub base: usize,
    pub page_count: usize,
}

/// Opaque address-space handle produced by the memory collaborator and
/// threaded through process creation without ever being interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressSpaceHandle(pub u64);

/// Architecture-specific register save/restore and context switching.
pub trait ArchOps: Send + Sync {
    /// Initialize a context block so resuming it begins executing
    /// `entry(arg)` on a freshly allocated kernel stack.
    fn init_thread_context(&self, stack_top: usize, entry: usize, arg: usize) -> ArchContext;

    /// Save the currently running thread's registers into its context block.
    fn save_context(&self, ctx: &mut ArchContext);

    /// Restore a thread's registers from its context block.
    fn restore_context(&self, ctx: &ArchContext);

    /// Atomically save `old` and restore `new` from the caller's point of
    /// view; after this returns, execution in `new` continues at the
    /// instruction following its own last call to `switch_context`.
    fn switch_context(&self, old: &mut ArchContext, new: &ArchContext) {
        self.save_context(old);
        self.restore_context(new);
    }

    fn switch_address_space(&self, handle: AddressSpaceHandle);

    fn halt(&self);
}

/// The physical/virtual memory manager.
pub trait MemOps: Send + Sync {
    fn alloc_pages(&self, n: usize) -> Option<PageRange>;
    fn free_pages(&self, range: PageRange);
    fn alloc(&self, size: usize) -> Option<Vec<u8>>;
    fn new_address_space(&self) -> AddressSpaceHandle;
}

/// Timer and interrupt controller access.
pub trait HalOps: Send + Sync {
    /// Period in milliseconds between `timer_tick` calls, per spec "10 ms
    /// for priorities below realtime".
    fn timer_period_ms(&self) -> u64 {
        10
    }
    fn timer_enable(&self, period_ms: u64);
    fn interrupts_enable(&self);
}

/// A no-op architecture collaborator for hosted testing: contexts are
/// opaque byte blobs, switching never touches real registers.
#[derive(Debug, Default)]
pub struct NullArch;

impl ArchOps for NullArch {
    fn init_thread_context(&self, stack_top: usize, entry: usize, arg: usize) -> ArchContext {
        let mut buf = Vec::with_capacity(24);
        buf.extend_from_slice(&(stack_top as u64).to_le_bytes());
        buf.extend_from_slice(&(entry as u64).to_le_bytes());
        buf.extend_from_slice(&(arg as u64).to_le_bytes());
        ArchContext(buf)
    }

    fn save_context(&self, _ctx: &mut ArchContext) {}
    fn restore_context(&self, _ctx: &ArchContext) {}
    fn switch_address_space(&self, _handle: AddressSpaceHandle) {}
    fn halt(&self) {}
}

/// A heap-backed memory collaborator: `alloc_pages`/`alloc` come straight
/// from the process heap, address spaces are just monotonic ids.
pub struct HeapMem {
    next_addr_space: std::sync::atomic::AtomicU64,
}

impl Default for HeapMem {
    fn default() -> Self {
        Self {
            next_addr_space: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

const PAGE_SIZE: usize = 4096;

impl MemOps for HeapMem {
    fn alloc_pages(&self, n: usize) -> Option<PageRange> {
        if n == 0 {
            return None;
        }
        let layout = vec![0u8; n * PAGE_SIZE].leak();
        Some(PageRange {
            base: layout.as_ptr() as usize,
            page_count: n,
        })
    }

    fn free_pages(&self, range: PageRange) {
        // Leaked above for simplicity; a real MemOps reclaims via the page
        // allocator. Reconstructing and dropping the Vec here would be
        // sound only if `range` always originated from `alloc_pages`.
        unsafe {
            let _ = Vec::from_raw_parts(range.base as *mut u8, 0, range.page_count * PAGE_SIZE);
        }
    }

    fn alloc(&self, size: usize) -> Option<Vec<u8>> {
        Some(vec![0u8; size])
    }

    fn new_address_space(&self) -> AddressSpaceHandle {
        let id = self
            .next_addr_space
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        AddressSpaceHandle(id)
    }
}

#[derive(Debug, Default)]
pub struct NullHal;

impl HalOps for NullHal {
    fn timer_enable(&self, _period_ms: u64) {}
    fn interrupts_enable(&self) {}
}
