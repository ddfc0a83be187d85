//! Assertions encoding spec §8's quantified invariants 1-5 (6-8 are
//! exercised as literal scenario tests next to `hive::store` and
//! `hive::header` in `sis-kernel-core` instead, since they're about one
//! concrete compact/checksum transform rather than arbitrary sequences).

use sis_kernel_core::cap::{CapRights, CapTable, ObjectKind};
use sis_kernel_core::config::KernelConfig;
use sis_kernel_core::hive::{Hive, HEADER_SIZE};
use sis_kernel_core::ipc::Message;
use sis_kernel_core::kernel::Kernel;
use sis_kernel_core::process::Priority;
use sis_kernel_core::Status;

use super::generators::{DeriveChain, SendReceivePlan};

/// Invariant 1: walking cells from the header boundary by `|size|` reaches
/// exactly `header.size`, with no gaps or overlaps along the way.
pub fn assert_hive_walk_reaches_total_size(hive: &Hive) {
    let cells = hive.walk().expect("hive produced by the core is always walkable");
    let mut cursor = HEADER_SIZE as u32;
    for cell in &cells {
        assert_eq!(cell.offset, cursor, "cell walk has a gap or overlap at {cursor:#x}");
        cursor += cell.total_len;
    }
    assert_eq!(cursor, hive.size(), "cell walk did not land on header.size");
}

/// Invariant 2: no two adjacent cells are both free (free always coalesces
/// with its neighbors).
pub fn assert_no_adjacent_free_cells(hive: &Hive) {
    let cells = hive.walk().expect("hive produced by the core is always walkable");
    for pair in cells.windows(2) {
        assert!(
            !(pair[0].state.is_free() && pair[1].state.is_free()),
            "adjacent free cells at {:#x} and {:#x} should have coalesced",
            pair[0].offset,
            pair[1].offset,
        );
    }
}

/// Invariant 3: `lookup(cap, r')` returns the object iff `r' ⊆ r`, the
/// rights the capability was inserted with — including `r' = 0`.
pub fn assert_cap_lookup_matches_rights_subset(
    table: &CapTable,
    cap: u32,
    insert_rights: CapRights,
    probe_rights: CapRights,
) {
    let expected = insert_rights.contains(probe_rights);
    let found = table.lookup(cap, probe_rights).is_some();
    assert_eq!(
        found, expected,
        "lookup({cap}, {probe_rights:?}) disagreed with insert_rights {insert_rights:?}"
    );
}

/// Invariant 4: every successful derivation in a chain holds exactly the
/// rights it requested, and every requested mask not a subset of the
/// current rights is rejected with `AccessDenied`.
pub fn assert_derive_preserves_subset_rights(chain: DeriveChain) {
    let mut table = CapTable::new(32);
    let mut current_cap = table
        .insert(ObjectKind::Thread, chain.root_rights, 0)
        .expect("fresh table always has room for the root");
    let mut current_rights = chain.root_rights;

    for requested in chain.steps {
        let result = table.derive(current_cap, requested);
        if current_rights.contains(requested) {
            let new_cap = result.expect("requested rights are a subset, derive must succeed");
            for bit in [CapRights::SEND, CapRights::RECV, CapRights::MAP, CapRights::CTRL] {
                let expects_bit = requested.contains(bit);
                assert_eq!(
                    table.lookup(new_cap, bit).is_some(),
                    expects_bit,
                    "derived capability rights drifted from the requested mask"
                );
            }
            current_cap = new_cap;
            current_rights = requested;
        } else {
            assert!(
                result.is_err(),
                "derive({requested:?}) should be rejected: not a subset of {current_rights:?}"
            );
        }
    }
}

/// Invariant 5: `N` successful sends to an initially empty mailbox
/// followed by `N` receives delivers the same messages in order, with
/// every send beyond the first observing `Pending` and being retried once
/// the receiver drains the slot (spec's documented blocked-sender-does-not-
/// preserve-payload behavior, SPEC_FULL.md §9).
pub fn assert_send_receive_preserves_order(plan: SendReceivePlan) {
    let kernel = Kernel::new(KernelConfig::default());
    let pid = kernel.create_process("property").expect("fresh kernel has room for one process");
    let sender = kernel
        .spawn_thread(pid, 0, 0, Priority::Normal)
        .expect("fresh process has room for a thread");
    let receiver = kernel
        .spawn_thread(pid, 0, 0, Priority::Normal)
        .expect("fresh process has room for a second thread");
    let cap = kernel
        .grant_capability(sender, CapRights::SEND, receiver)
        .expect("sender's fresh capability table has room");

    let mut delivered = Vec::new();
    for msg in &plan.messages {
        loop {
            match kernel.send(sender, cap, *msg) {
                Status::Success => break,
                Status::Pending => {
                    let mut out = Message::default();
                    assert_eq!(kernel.receive(receiver, &mut out), Status::Success);
                    delivered.push(out);
                }
                other => panic!("unexpected status from send: {other:?}"),
            }
        }
    }
    loop {
        let mut out = Message::default();
        match kernel.receive(receiver, &mut out) {
            Status::Success => delivered.push(out),
            _ => break,
        }
    }

    assert_eq!(delivered.len(), plan.messages.len(), "message count changed in transit");
    assert_eq!(delivered, plan.messages, "messages were reordered, lost, or duplicated");
}
