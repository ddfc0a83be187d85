//! Model state and replay helpers backing the strategies in
//! [`super::strategies`].

use sis_kernel_core::cap::CapRights;
use sis_kernel_core::hive::{Hive, Signature};
use sis_kernel_core::ipc::Message;

/// One step of an arbitrary allocate/free sequence against a single hive.
#[derive(Debug, Clone, Copy)]
pub enum HiveOp {
    Allocate(u32),
    /// Index into the *currently allocated* offset list, taken modulo its
    /// length at replay time so any `usize` the strategy produces is valid.
    FreeIndex(usize),
}

/// Replay `ops` against `hive`, ignoring `InsufficientResources` (the
/// generator doesn't know the hive's remaining capacity) and out-of-range
/// free indices (taken modulo the live allocation count).
pub fn apply_hive_ops(hive: &Hive, ops: &[HiveOp]) {
    let mut live: Vec<u32> = Vec::new();
    for op in ops {
        match *op {
            HiveOp::Allocate(size) => {
                if let Ok(offset) = hive.allocate_tagged(size, Signature::Data) {
                    live.push(offset);
                }
            }
            HiveOp::FreeIndex(idx) => {
                if !live.is_empty() {
                    let offset = live.remove(idx % live.len());
                    let _ = hive.free(offset);
                }
            }
        }
    }
}

/// A linear chain of capability derivations starting from one inserted
/// root. Each step is the *requested* rights mask for the next derivation
/// attempted against the most recently derived (or root) capability —
/// whether or not it is actually a subset of the current rights is exactly
/// what the invariant check in [`super::invariants`] exercises.
#[derive(Debug, Clone)]
pub struct DeriveChain {
    pub root_rights: CapRights,
    pub steps: Vec<CapRights>,
}

/// A sequence of register-only messages to push through a mailbox/fastpath
/// pair in order, exercising invariant 5 (spec §8).
#[derive(Debug, Clone)]
pub struct SendReceivePlan {
    pub messages: Vec<Message>,
}
