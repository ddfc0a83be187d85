//! The hive: a self-describing, cell-allocated persistent store in the
//! style of an NT registry hive file (spec §3/§4.A/§6).

mod cell;
mod header;
mod store;
mod view;

pub use cell::{align8, CellState, Signature, PREFIX_SIZE};
pub use header::{HiveHeader, CURRENT_VERSION_MAJOR, CURRENT_VERSION_MINOR, HEADER_SIZE, MAGIC};
pub use store::{integrity_check, CellInfo, Hive, Statistics};
pub use view::HiveView;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allocate_offsets_match_first_fit_layout() {
        let hive = Hive::create(65536);
        let a = hive.allocate(40).unwrap();
        let b = hive.allocate(80).unwrap();
        let c = hive.allocate(40).unwrap();
        assert_eq!(a, HEADER_SIZE as u32);
        assert_eq!(b, HEADER_SIZE as u32 + 48);
        assert_eq!(c, HEADER_SIZE as u32 + 48 + 88);
    }

    #[test]
    fn free_coalesces_with_neighbors() {
        let hive = Hive::create(65536);
        let a = hive.allocate(40).unwrap();
        let b = hive.allocate(80).unwrap();
        let c = hive.allocate(40).unwrap();
        hive.free(b).unwrap();
        hive.free(a).unwrap();
        hive.free(c).unwrap();

        let cells = hive.walk().unwrap();
        assert_eq!(cells.len(), 1);
        assert!(cells[0].state.is_free());
        assert_eq!(cells[0].offset, HEADER_SIZE as u32);
    }

    #[test]
    fn write_then_get_round_trips_payload() {
        let hive = Hive::create(65536);
        let off = hive.allocate(16).unwrap();
        hive.write(off, b"0123456789abcdef").unwrap();
        let payload = hive.get(off, 16).unwrap();
        assert_eq!(payload, b"0123456789abcdef");
    }

    #[test]
    fn integrity_check_rejects_truncated_image() {
        let hive = Hive::create(65536);
        let bytes = hive.serialize();
        let err = integrity_check(&bytes[..HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, crate::error::HiveError::Corrupt(_)));
    }

    #[test]
    fn integrity_check_rejects_corrupted_checksum() {
        let hive = Hive::create(65536);
        let mut bytes = hive.serialize();
        bytes[10] ^= 0xFF;
        let err = integrity_check(&bytes).unwrap_err();
        assert_eq!(err, crate::error::HiveError::ChecksumMismatch);
    }

    #[test]
    fn integrity_check_rejects_cell_size_overshoot() {
        // S5: corrupt the trailing free cell's `size` field so the walk
        // overshoots the image. The header checksum only covers the header
        // block, not cell bytes, so it still passes and `SizeMismatch` is
        // what surfaces.
        let hive = Hive::create(65536);
        hive.allocate(40).unwrap();
        let free_cell = hive
            .walk()
            .unwrap()
            .into_iter()
            .find(|c| c.state.is_free())
            .expect("trailing free cell");

        let mut bytes = hive.serialize();
        let corrupted_len = (free_cell.total_len + 16) as i32;
        bytes[free_cell.offset as usize..free_cell.offset as usize + 4]
            .copy_from_slice(&corrupted_len.to_le_bytes());

        let err = integrity_check(&bytes).unwrap_err();
        assert_eq!(err, crate::error::HiveError::SizeMismatch);
    }

    #[test]
    fn compact_preserves_allocated_payloads() {
        let hive = Hive::create(65536);
        let a = hive.allocate(40).unwrap();
        hive.write(a, &[1u8; 40]).unwrap();
        let b = hive.allocate(80).unwrap();
        hive.write(b, &[2u8; 80]).unwrap();
        let c = hive.allocate(40).unwrap();
        hive.write(c, &[3u8; 40]).unwrap();
        hive.free(b).unwrap();

        hive.compact().unwrap();
        let cells = hive.walk().unwrap();
        let allocated: Vec<_> = cells.iter().filter(|c| !c.state.is_free()).collect();
        assert_eq!(allocated.len(), 2);

        let payload_a = hive.get(allocated[0].offset, 40).unwrap();
        assert_eq!(payload_a, vec![1u8; 40]);
        let payload_c = hive.get(allocated[1].offset, 40).unwrap();
        assert_eq!(payload_c, vec![3u8; 40]);
    }

    #[test]
    fn compacted_copy_leaves_original_untouched() {
        let hive = Hive::create(65536);
        let a = hive.allocate(40).unwrap();
        hive.write(a, &[7u8; 40]).unwrap();
        let before = hive.walk().unwrap();

        let copy = hive.compacted_copy().unwrap();
        assert_eq!(hive.walk().unwrap(), before);
        let copy_cells = copy.walk().unwrap();
        let allocated = copy_cells.iter().find(|c| !c.state.is_free()).unwrap();
        assert_eq!(copy.get(allocated.offset, 40).unwrap(), vec![7u8; 40]);
    }

    #[test]
    fn from_bytes_round_trips_through_serialize() {
        let hive = Hive::create(65536);
        hive.allocate(40).unwrap();
        let bytes = hive.serialize();
        let restored = Hive::from_bytes(bytes.clone()).unwrap();
        assert_eq!(restored.serialize(), bytes);
    }

    #[test]
    fn map_view_writes_back_on_drop() {
        let hive = Arc::new(Hive::create(65536));
        let off = hive.allocate(16).unwrap();
        hive.write(off, &[0u8; 16]).unwrap();
        {
            let mut view = hive.map_view(off, 16).unwrap();
            view.set(&[9u8; 16]).unwrap();
        }
        let payload = hive.get(off, 16).unwrap();
        assert_eq!(payload, vec![9u8; 16]);
    }

    #[test]
    fn statistics_counts_cells_and_fragmentation_bounds() {
        let hive = Hive::create(65536);
        hive.allocate(40).unwrap();
        let b = hive.allocate(80).unwrap();
        hive.allocate(40).unwrap();
        hive.free(b).unwrap();

        let stats = hive.statistics().unwrap();
        assert_eq!(stats.allocated_cells, 2);
        assert_eq!(stats.free_cells, 2);
        assert!(stats.fragmentation <= 100);
    }
}
