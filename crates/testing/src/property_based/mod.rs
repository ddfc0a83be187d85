//! Quantified invariants over arbitrary operation sequences.

pub mod generators;
pub mod invariants;
pub mod strategies;

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use sis_kernel_core::cap::{CapRights, CapTable, ObjectKind};
    use sis_kernel_core::hive::Hive;
    use sis_kernel_core::ipc::Message;

    use super::generators::{apply_hive_ops, DeriveChain};
    use super::invariants::{
        assert_cap_lookup_matches_rights_subset, assert_derive_preserves_subset_rights,
        assert_hive_walk_reaches_total_size, assert_no_adjacent_free_cells, assert_send_receive_preserves_order,
    };
    use super::strategies::{derive_chain, hive_op_sequence, rights_mask, send_receive_interleaving};

    proptest! {
        /// Invariant 1: walking the cell chain from the header boundary by
        /// `|size|` always lands exactly on `header.size`, for any sequence
        /// of allocate/free/resize operations the generator can produce.
        #[test]
        fn walk_reaches_total_size_after_any_op_sequence(ops in hive_op_sequence(64)) {
            let hive = Hive::create(1 << 20);
            apply_hive_ops(&hive, &ops);
            assert_hive_walk_reaches_total_size(&hive);
        }

        /// Invariant 2: no two adjacent free cells ever survive an
        /// allocate/free sequence (free always coalesces).
        #[test]
        fn no_adjacent_free_cells_after_any_op_sequence(ops in hive_op_sequence(64)) {
            let hive = Hive::create(1 << 20);
            apply_hive_ops(&hive, &ops);
            assert_no_adjacent_free_cells(&hive);
        }

        /// Invariant 3: `lookup(cap, r')` returns the object iff `r' ⊆ r`,
        /// including the `r' = 0` case, for an arbitrary inserted rights mask.
        #[test]
        fn lookup_matches_rights_subset(insert_rights in rights_mask(), probe_rights in rights_mask()) {
            let mut table = CapTable::new(16);
            let cap = table.insert(ObjectKind::Thread, insert_rights, 42).unwrap();
            assert_cap_lookup_matches_rights_subset(&table, cap, insert_rights, probe_rights);
        }

        /// Invariant 4: every successful derivation in an arbitrary chain of
        /// narrowing derivations holds exactly the requested rights, which
        /// are always a subset of their source's.
        #[test]
        fn derive_chain_preserves_subset_rights(chain in derive_chain(6)) {
            assert_derive_preserves_subset_rights(chain);
        }

        /// Invariant 5: N successful sends into an initially empty mailbox
        /// followed by N receives delivers the same messages in order, with
        /// every intermediate send observing `MailboxFull` and landing on
        /// the blocked FIFO.
        #[test]
        fn send_receive_preserves_order(plan in send_receive_interleaving(16)) {
            assert_send_receive_preserves_order(plan);
        }
    }

    #[test]
    fn derive_chain_strategy_never_yields_an_empty_chain() {
        // Sanity check on the strategy itself, not the core: a `DeriveChain`
        // must always have at least the root insertion.
        let chain: DeriveChain = DeriveChain {
            root_rights: CapRights::SEND,
            steps: Vec::new(),
        };
        assert!(chain.steps.is_empty());
    }

    #[test]
    fn message_round_trips_through_register_count() {
        let msg = Message::from_slice(&[1, 2, 3]);
        assert_eq!(msg.as_slice(), &[1, 2, 3]);
    }
}
