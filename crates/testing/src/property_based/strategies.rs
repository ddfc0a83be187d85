//! `proptest` `Strategy` definitions producing the generator types in
//! [`super::generators`].

use proptest::prelude::*;

use sis_kernel_core::cap::CapRights;
use sis_kernel_core::ipc::Message;

use super::generators::{DeriveChain, HiveOp, SendReceivePlan};

/// Any combination of the four capability rights bits.
pub fn rights_mask() -> impl Strategy<Value = CapRights> {
    (0u32..16).prop_map(CapRights::from_bits_truncate)
}

fn hive_op() -> impl Strategy<Value = HiveOp> {
    prop_oneof![
        (8u32..512).prop_map(HiveOp::Allocate),
        (0usize..64).prop_map(HiveOp::FreeIndex),
    ]
}

pub fn hive_op_sequence(max_len: usize) -> impl Strategy<Value = Vec<HiveOp>> {
    prop::collection::vec(hive_op(), 0..=max_len)
}

pub fn derive_chain(max_len: usize) -> impl Strategy<Value = DeriveChain> {
    (rights_mask(), prop::collection::vec(rights_mask(), 0..=max_len))
        .prop_map(|(root_rights, steps)| DeriveChain { root_rights, steps })
}

/// Between 1 and `max_n` register-only messages, each a single arbitrary
/// `u64` register (enough to distinguish messages for ordering checks
/// without needing the full four-register payload).
pub fn send_receive_interleaving(max_n: usize) -> impl Strategy<Value = SendReceivePlan> {
    (1usize..=max_n)
        .prop_flat_map(|n| prop::collection::vec(any::<u64>(), n))
        .prop_map(|regs| SendReceivePlan {
            messages: regs.into_iter().map(|r| Message::from_slice(&[r])).collect(),
        })
}
