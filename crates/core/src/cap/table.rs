//! Fixed-capacity per-thread capability table (spec §3/§4.B).

use bitflags::bitflags;

use crate::error::CapError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapRights: u32 {
        const SEND = 0b0001;
        const RECV = 0b0010;
        const MAP  = 0b0100;
        const CTRL = 0b1000;
    }
}

/// What a capability's `object` field identifies. `Free` is never stored in
/// an occupied slot; it is the sentinel `insert`/`revoke` use to recognize
/// an empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Free,
    Thread,
    Hive,
    Process,
}

impl ObjectKind {
    fn is_free(self) -> bool {
        matches!(self, ObjectKind::Free)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CapEntry {
    kind: ObjectKind,
    rights: CapRights,
    /// Opaque object id — a thread id, hive id, or process id depending on
    /// `kind`. The table never interprets it beyond equality/copy.
    object: u64,
}

impl CapEntry {
    const FREE: Self = Self {
        kind: ObjectKind::Free,
        rights: CapRights::empty(),
        object: 0,
    };
}

/// A thread's capability table: 256 fixed slots, linear scan for the
/// lowest free index on insert (spec: "O(n) over 256 entries").
pub struct CapTable {
    entries: Vec<CapEntry>,
}

impl CapTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![CapEntry::FREE; capacity],
        }
    }

    /// Lowest-index free slot. `CapError::NoSlot` if the table is full.
    pub fn insert(&mut self, kind: ObjectKind, rights: CapRights, object: u64) -> Result<u32, CapError> {
        let slot = self
            .entries
            .iter()
            .position(|e| e.kind.is_free())
            .ok_or(CapError::NoSlot)?;
        self.entries[slot] = CapEntry { kind, rights, object };
        Ok(slot as u32)
    }

    /// Returns `(kind, object)` only if the capability exists and holds at
    /// least `required` rights. A missing right is indistinguishable from a
    /// missing capability to the caller — lookup does not leak existence.
    pub fn lookup(&self, cap: u32, required: CapRights) -> Option<(ObjectKind, u64)> {
        let entry = self.entries.get(cap as usize)?;
        if entry.kind.is_free() {
            return None;
        }
        if !entry.rights.contains(required) {
            return None;
        }
        Some((entry.kind, entry.object))
    }

    /// Creates a new entry referencing the same object with `new_rights`,
    /// which must be a subset of the source capability's rights.
    pub fn derive(&mut self, src_cap: u32, new_rights: CapRights) -> Result<u32, CapError> {
        let src = self.entries.get(src_cap as usize).copied().ok_or(CapError::NotFound)?;
        if src.kind.is_free() {
            return Err(CapError::NotFound);
        }
        if !src.rights.contains(new_rights) {
            return Err(CapError::AccessDenied);
        }
        self.insert(src.kind, new_rights, src.object)
    }

    pub fn revoke(&mut self, cap: u32) -> Result<(), CapError> {
        let entry = self.entries.get_mut(cap as usize).ok_or(CapError::NotFound)?;
        if entry.kind.is_free() {
            return Err(CapError::NotFound);
        }
        *entry = CapEntry::FREE;
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_chain_matches_scenario_s3() {
        let mut table = CapTable::new(256);
        let cap0 = table
            .insert(
                ObjectKind::Thread,
                CapRights::SEND | CapRights::RECV | CapRights::MAP | CapRights::CTRL,
                7,
            )
            .unwrap();
        let cap1 = table.derive(cap0, CapRights::SEND | CapRights::RECV).unwrap();
        let err = table.derive(cap1, CapRights::SEND | CapRights::MAP).unwrap_err();
        assert_eq!(err, CapError::AccessDenied);
        assert!(table.lookup(cap1, CapRights::CTRL).is_none());
    }

    #[test]
    fn lookup_with_zero_rights_still_returns_object() {
        let mut table = CapTable::new(256);
        let cap = table.insert(ObjectKind::Hive, CapRights::SEND, 1).unwrap();
        assert!(table.lookup(cap, CapRights::empty()).is_some());
    }

    #[test]
    fn revoke_frees_the_slot_for_reuse() {
        let mut table = CapTable::new(4);
        let cap = table.insert(ObjectKind::Thread, CapRights::SEND, 1).unwrap();
        table.revoke(cap).unwrap();
        assert!(table.lookup(cap, CapRights::empty()).is_none());
        assert_eq!(table.revoke(cap).unwrap_err(), CapError::NotFound);
    }

    #[test]
    fn insert_fails_once_table_is_full() {
        let mut table = CapTable::new(2);
        table.insert(ObjectKind::Thread, CapRights::SEND, 1).unwrap();
        table.insert(ObjectKind::Thread, CapRights::SEND, 2).unwrap();
        assert_eq!(
            table.insert(ObjectKind::Thread, CapRights::SEND, 3).unwrap_err(),
            CapError::NoSlot
        );
    }
}
