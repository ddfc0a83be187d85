//! Property-based invariant checks for the hive allocator, the capability
//! table, and the IPC mailbox (spec §8, invariants 1-8). Scenario-literal
//! tests (S1-S6) live as unit tests next to the modules they exercise in
//! `sis-kernel-core`; this crate covers the quantified properties over
//! arbitrary operation sequences that a handful of hand-picked scenarios
//! can't.

pub mod property_based;
