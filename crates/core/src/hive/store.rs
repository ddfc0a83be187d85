//! The cell allocator: allocate/free/get/write/read/resize/walk/validate/
//! compact/statistics/integrity_check/map_view/compacted_copy (spec §4.A).
//!
//! The hive is represented as a single owned byte buffer with the header
//! always stamped into its first [`HEADER_SIZE`] bytes, so the buffer alone
//! is the authoritative, bit-exact image — `serialize()` is a cheap clone,
//! not a re-encode.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::cell::{align8, CellPrefix, CellState, Signature, PREFIX_SIZE};
use super::header::{magic_ok, verify_checksum, HiveHeader, HEADER_SIZE};
use crate::error::HiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInfo {
    pub offset: u32,
    pub total_len: u32,
    pub state: CellState,
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Statistics {
    pub allocated_cells: u32,
    pub free_cells: u32,
    pub total_size: u32,
    pub free_size: u32,
    /// `free_cells * 100 / max(1, total_size / 1024)`, adjusted downward by
    /// how much of the free space sits in one contiguous block (glossary:
    /// "Fragmentation"). A hive with a single large trailing free cell
    /// scores near zero even with many kilobytes free.
    pub fragmentation: u32,
}

struct HiveInner {
    buf: Vec<u8>,
    header: HiveHeader,
    dirty: bool,
    /// Exclusive-compaction generation counter. Bumped on every `compact`;
    /// offsets issued before a bump are a caller contract violation to
    /// reuse, checked only in debug builds (see SPEC_FULL.md open question
    /// on compaction concurrency).
    generation: u64,
    first_free_hint: Option<u32>,
    /// Live [`super::view::HiveView`] refcounts keyed by `(offset, size)`.
    view_refs: HashMap<(u32, u32), u32>,
}

/// A persistent, self-describing byte image divided into a 4096-byte
/// header and a packed sequence of variable-length cells.
pub struct Hive {
    inner: Mutex<HiveInner>,
}

impl Hive {
    /// Allocate a zeroed region of `size` bytes and write a valid header
    /// plus one maximal free cell spanning the rest of the image.
    pub fn create(size: usize) -> Self {
        assert!(size > HEADER_SIZE + PREFIX_SIZE, "hive too small for header + one cell");
        let mut buf = vec![0u8; size];
        let header = HiveHeader::new(size as u32);
        header.write_to(&mut buf[..HEADER_SIZE]);

        let free_len = (size - HEADER_SIZE) as u32;
        CellPrefix {
            state: CellState::Free(free_len),
            signature: Signature::Free,
            flags: 0,
        }
        .write_to(&mut buf[HEADER_SIZE..HEADER_SIZE + PREFIX_SIZE]);

        Self {
            inner: Mutex::new(HiveInner {
                buf,
                header,
                dirty: false,
                generation: 0,
                first_free_hint: Some(HEADER_SIZE as u32),
                view_refs: HashMap::new(),
            }),
        }
    }

    /// Reconstruct a hive from a byte image previously produced by
    /// [`Hive::serialize`] or [`Hive::compacted_copy`], after verifying it.
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self, HiveError> {
        integrity_check(&buf)?;
        let header = HiveHeader::read_from(&buf).ok_or(HiveError::InvalidSignature)?;
        Ok(Self {
            inner: Mutex::new(HiveInner {
                buf,
                header,
                dirty: false,
                generation: 0,
                first_free_hint: None,
                view_refs: HashMap::new(),
            }),
        })
    }

    pub fn size(&self) -> u32 {
        self.inner.lock().header.total_size
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub fn root_cell(&self) -> u32 {
        self.inner.lock().header.root_cell_offset
    }

    /// Re-point the root key at `offset` and re-stamp the header
    /// (spec §4.G's registry façade calls this once, on first use).
    pub fn set_root_cell(&self, offset: u32) {
        let mut inner = self.inner.lock();
        inner.header.root_cell_offset = offset;
        let header = inner.header;
        header.write_to(&mut inner.buf[..HEADER_SIZE]);
        inner.dirty = true;
    }

    /// Bump the torn-write sequence numbers and re-stamp the header: the
    /// primary sequence increments before this call is observed by anyone
    /// (it is bumped first, inline), the secondary after. Equality of the
    /// two on a subsequent load attests a clean flush (SPEC_FULL.md §9).
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.header.seq_primary = inner.header.seq_primary.wrapping_add(1);
        let header = inner.header;
        header.write_to(&mut inner.buf[..HEADER_SIZE]);
        inner.header.seq_secondary = inner.header.seq_primary;
        let header = inner.header;
        header.write_to(&mut inner.buf[..HEADER_SIZE]);
        inner.dirty = false;
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.inner.lock().buf.clone()
    }

    /// First-fit scan over cells from the header boundary; returns
    /// `(offset, total_len, state, signature)` for the first cell whose
    /// condition holds.
    fn scan_cells(buf: &[u8]) -> Result<Vec<CellInfo>, HiveError> {
        let total = buf.len() as u32;
        let mut offset = HEADER_SIZE as u32;
        let mut cells = Vec::new();
        while offset < total {
            let prefix_bytes = buf
                .get(offset as usize..offset as usize + PREFIX_SIZE)
                .ok_or(HiveError::Corrupt("cell prefix runs past end of image"))?;
            let prefix = CellPrefix::read_from(prefix_bytes)
                .ok_or(HiveError::Corrupt("truncated cell prefix"))?;
            let total_len = prefix.state.total_len();
            if total_len < PREFIX_SIZE as u32 {
                return Err(HiveError::Corrupt("cell shorter than its own prefix"));
            }
            if offset + total_len > total {
                return Err(HiveError::SizeMismatch);
            }
            cells.push(CellInfo {
                offset,
                total_len,
                state: prefix.state,
                signature: prefix.signature,
            });
            offset += total_len;
        }
        if offset != total {
            return Err(HiveError::Corrupt("walk undershot hive image"));
        }
        Ok(cells)
    }

    /// Rounds `payload_size` up to a multiple of 8, linearly scans free
    /// cells for the first one large enough, splits the remainder back
    /// into a free cell when it would otherwise leave a fragment, and
    /// returns the *cell* offset (prefix included) of the new allocation.
    pub fn allocate(&self, payload_size: u32) -> Result<u32, HiveError> {
        let mut inner = self.inner.lock();
        let needed_payload = align8(payload_size);
        let needed_total = needed_payload + PREFIX_SIZE as u32;

        let cells = Self::scan_cells(&inner.buf)?;
        let candidate = cells
            .iter()
            .find(|c| c.state.is_free() && c.total_len >= needed_total)
            .copied()
            .ok_or(HiveError::InsufficientResources)?;

        let remainder = candidate.total_len - needed_total;
        let off = candidate.offset as usize;

        if remainder > PREFIX_SIZE as u32 {
            CellPrefix {
                state: CellState::Allocated(needed_total),
                signature: Signature::Free, // overwritten by caller once it knows nk/vk/etc
                flags: 0,
            }
            .write_to(&mut inner.buf[off..off + PREFIX_SIZE]);

            let split_off = off + needed_total as usize;
            CellPrefix {
                state: CellState::Free(remainder),
                signature: Signature::Free,
                flags: 0,
            }
            .write_to(&mut inner.buf[split_off..split_off + PREFIX_SIZE]);
        } else {
            CellPrefix {
                state: CellState::Allocated(candidate.total_len),
                signature: Signature::Free,
                flags: 0,
            }
            .write_to(&mut inner.buf[off..off + PREFIX_SIZE]);
        }

        inner.first_free_hint = None;
        inner.dirty = true;
        Ok(candidate.offset)
    }

    /// Allocate and immediately tag the cell with a concrete signature
    /// (the generic `allocate` leaves a placeholder tag since it doesn't
    /// know what the caller intends to store).
    pub fn allocate_tagged(&self, payload_size: u32, signature: Signature) -> Result<u32, HiveError> {
        let offset = self.allocate(payload_size)?;
        let mut inner = self.inner.lock();
        let off = offset as usize;
        let mut prefix = CellPrefix::read_from(&inner.buf[off..off + PREFIX_SIZE]).unwrap();
        prefix.signature = signature;
        prefix.write_to(&mut inner.buf[off..off + PREFIX_SIZE]);
        Ok(offset)
    }

    /// Free an allocated cell, coalescing with the following cell in O(1)
    /// and then rescanning from the header boundary to coalesce with the
    /// preceding cell (spec: "free is rare relative to read").
    pub fn free(&self, offset: u32) -> Result<(), HiveError> {
        let mut inner = self.inner.lock();
        self.validate_locked(&inner, offset)?;

        let off = offset as usize;
        let mut prefix = CellPrefix::read_from(&inner.buf[off..off + PREFIX_SIZE]).unwrap();
        if !matches!(prefix.state, CellState::Allocated(_)) {
            return Err(HiveError::NotAllocated(offset));
        }
        let mut total_len = prefix.state.total_len();

        // Coalesce with the next cell if it is free and fully in range.
        let next_off = offset + total_len;
        if next_off < inner.header.total_size {
            let next_off_usize = next_off as usize;
            if let Some(next_prefix) =
                CellPrefix::read_from(&inner.buf[next_off_usize..next_off_usize + PREFIX_SIZE])
            {
                if next_prefix.state.is_free() {
                    total_len += next_prefix.state.total_len();
                }
            }
        }

        prefix.state = CellState::Free(total_len);
        prefix.signature = Signature::Free;
        prefix.write_to(&mut inner.buf[off..off + PREFIX_SIZE]);

        // Coalesce with the previous cell by rescanning from the start.
        let cells = Self::scan_cells(&inner.buf)?;
        if let Some(prev) = cells
            .iter()
            .find(|c| c.offset + c.total_len == offset && c.state.is_free())
        {
            let merged_len = prev.total_len + total_len;
            let prev_off = prev.offset as usize;
            CellPrefix {
                state: CellState::Free(merged_len),
                signature: Signature::Free,
                flags: 0,
            }
            .write_to(&mut inner.buf[prev_off..prev_off + PREFIX_SIZE]);
        }

        inner.first_free_hint = None;
        inner.dirty = true;
        Ok(())
    }

    fn validate_locked(&self, inner: &HiveInner, offset: u32) -> Result<(), HiveError> {
        if offset < HEADER_SIZE as u32 || offset >= inner.header.total_size {
            return Err(HiveError::InvalidOffset(offset));
        }
        let off = offset as usize;
        let prefix = inner
            .buf
            .get(off..off + PREFIX_SIZE)
            .and_then(CellPrefix::read_from)
            .ok_or(HiveError::InvalidOffset(offset))?;
        let total_len = prefix.state.total_len();
        if total_len < PREFIX_SIZE as u32 {
            return Err(HiveError::Corrupt("cell shorter than its own prefix"));
        }
        if offset + total_len > inner.header.total_size {
            return Err(HiveError::Corrupt("cell overshoots hive image"));
        }
        Ok(())
    }

    pub fn validate(&self, offset: u32) -> Result<(), HiveError> {
        let inner = self.inner.lock();
        self.validate_locked(&inner, offset)
    }

    /// Returns a copy of the payload at `offset` (an allocated cell whose
    /// payload is at least `size` bytes). The hive lock is held only for
    /// the duration of the copy, so the returned buffer — unlike a
    /// borrowed view — survives subsequent mutations; callers that need a
    /// zero-copy window use [`Hive::map_view`] instead.
    pub fn get(&self, offset: u32, size: u32) -> Result<Vec<u8>, HiveError> {
        let inner = self.inner.lock();
        self.validate_locked(&inner, offset)?;
        let off = offset as usize;
        let prefix = CellPrefix::read_from(&inner.buf[off..off + PREFIX_SIZE]).unwrap();
        match prefix.state {
            CellState::Allocated(total) if total >= size + PREFIX_SIZE as u32 => {
                let start = off + PREFIX_SIZE;
                let end = start + size as usize;
                Ok(inner.buf[start..end].to_vec())
            }
            CellState::Allocated(_) => Err(HiveError::SizeMismatch),
            CellState::Free(_) => Err(HiveError::NotAllocated(offset)),
        }
    }

    pub fn write(&self, offset: u32, bytes: &[u8]) -> Result<(), HiveError> {
        let mut inner = self.inner.lock();
        self.validate_locked(&inner, offset)?;
        let off = offset as usize;
        let prefix = CellPrefix::read_from(&inner.buf[off..off + PREFIX_SIZE]).unwrap();
        let total = match prefix.state {
            CellState::Allocated(total) => total,
            CellState::Free(_) => return Err(HiveError::NotAllocated(offset)),
        };
        if total < bytes.len() as u32 + PREFIX_SIZE as u32 {
            return Err(HiveError::SizeMismatch);
        }
        let start = off + PREFIX_SIZE;
        inner.buf[start..start + bytes.len()].copy_from_slice(bytes);
        inner.dirty = true;
        Ok(())
    }

    pub fn read(&self, offset: u32, out: &mut [u8]) -> Result<(), HiveError> {
        let payload = self.get(offset, out.len() as u32)?;
        out.copy_from_slice(&payload);
        Ok(())
    }

    /// Not required to preserve `offset`: frees the old cell and
    /// reallocates large enough to hold `new_size`, copying over whatever
    /// of the old payload still fits.
    pub fn resize(&self, offset: u32, new_size: u32) -> Result<u32, HiveError> {
        let old = {
            let inner = self.inner.lock();
            self.validate_locked(&inner, offset)?;
            let off = offset as usize;
            let prefix = CellPrefix::read_from(&inner.buf[off..off + PREFIX_SIZE]).unwrap();
            match prefix.state {
                CellState::Allocated(total) => {
                    let payload_len = (total - PREFIX_SIZE as u32) as usize;
                    let start = off + PREFIX_SIZE;
                    inner.buf[start..start + payload_len].to_vec()
                }
                CellState::Free(_) => return Err(HiveError::NotAllocated(offset)),
            }
        };

        self.free(offset)?;
        let new_offset = self.allocate(new_size)?;
        let keep = old.len().min(new_size as usize);
        if keep > 0 {
            self.write(new_offset, &old[..keep])?;
        }
        Ok(new_offset)
    }

    pub fn walk(&self) -> Result<Vec<CellInfo>, HiveError> {
        let inner = self.inner.lock();
        Self::scan_cells(&inner.buf)
    }

    pub fn statistics(&self) -> Result<Statistics, HiveError> {
        let cells = self.walk()?;
        let total_size = self.size();
        let mut stats = Statistics {
            total_size,
            ..Default::default()
        };
        let mut largest_free: u32 = 0;
        for cell in &cells {
            match cell.state {
                CellState::Allocated(_) => stats.allocated_cells += 1,
                CellState::Free(len) => {
                    stats.free_cells += 1;
                    stats.free_size += len;
                    largest_free = largest_free.max(len);
                }
            }
        }
        let kib = (total_size / 1024).max(1);
        let base = stats.free_cells.saturating_mul(100) / kib;
        let largest_ratio = if stats.free_size > 0 {
            largest_free as f64 / stats.free_size as f64
        } else {
            1.0
        };
        stats.fragmentation = (base as f64 * (1.0 - largest_ratio)).round() as u32;
        Ok(stats)
    }

    /// Two-cursor sweep: pack every allocated cell to the front, emit one
    /// trailing free cell. All previously issued offsets are invalid after
    /// this returns (exclusive-compaction contract, SPEC_FULL.md §9).
    pub fn compact(&self) -> Result<(), HiveError> {
        let mut inner = self.inner.lock();
        let cells = Self::scan_cells(&inner.buf)?;

        let mut write_cursor = HEADER_SIZE;
        for cell in cells.iter().filter(|c| !c.state.is_free()) {
            let read_off = cell.offset as usize;
            let len = cell.total_len as usize;
            if read_off != write_cursor {
                inner.buf.copy_within(read_off..read_off + len, write_cursor);
            }
            write_cursor += len;
        }

        let total = inner.header.total_size as usize;
        let tail_len = total - write_cursor;
        if tail_len > 0 {
            debug_assert!(tail_len >= PREFIX_SIZE, "trailing space smaller than one cell prefix");
            CellPrefix {
                state: CellState::Free(tail_len as u32),
                signature: Signature::Free,
                flags: 0,
            }
            .write_to(&mut inner.buf[write_cursor..write_cursor + PREFIX_SIZE]);
            inner.buf[write_cursor + PREFIX_SIZE..total].fill(0);
        }

        inner.generation += 1;
        inner.first_free_hint = Some(write_cursor as u32);
        inner.dirty = true;
        Ok(())
    }

    /// Walks the source once, sizes a destination to the allocated bytes
    /// plus one page of margin, and copies allocated cells into it
    /// sequentially followed by a single trailing free cell.
    pub fn compacted_copy(&self) -> Result<Hive, HiveError> {
        const PAGE: u32 = 4096;
        let cells = self.walk()?;
        let allocated_bytes: u32 = cells
            .iter()
            .filter(|c| !c.state.is_free())
            .map(|c| c.total_len)
            .sum();

        let new_total = HEADER_SIZE as u32 + allocated_bytes + PAGE;
        let dest = Hive::create(new_total as usize);
        {
            let src = self.inner.lock();
            let mut dst = dest.inner.lock();
            let mut cursor = HEADER_SIZE;
            for cell in cells.iter().filter(|c| !c.state.is_free()) {
                let start = cell.offset as usize;
                let len = cell.total_len as usize;
                dst.buf[cursor..cursor + len].copy_from_slice(&src.buf[start..start + len]);
                cursor += len;
            }
            let tail_len = dst.buf.len() - cursor;
            CellPrefix {
                state: CellState::Free(tail_len as u32),
                signature: Signature::Free,
                flags: 0,
            }
            .write_to(&mut dst.buf[cursor..cursor + PREFIX_SIZE]);
            dst.first_free_hint = Some(cursor as u32);
            dst.dirty = true;
        }
        Ok(dest)
    }

    /// Page-aligned window over `[offset, offset+size)`. Overlapping
    /// requests at the exact same `(offset, size)` share a refcount;
    /// flush happens on release of the last reference if the hive is
    /// dirty. See [`super::view::HiveView`].
    pub fn map_view(self: &std::sync::Arc<Self>, offset: u32, size: u32) -> Result<super::view::HiveView, HiveError> {
        self.validate(offset)?;
        super::view::HiveView::new(self.clone(), offset, size)
    }

    pub(crate) fn register_view(&self, offset: u32, size: u32) {
        *self.inner.lock().view_refs.entry((offset, size)).or_insert(0) += 1;
    }

    /// Returns `true` once the refcount for `(offset, size)` drops to zero.
    pub(crate) fn release_view(&self, offset: u32, size: u32) -> bool {
        let mut inner = self.inner.lock();
        match inner.view_refs.get_mut(&(offset, size)) {
            Some(count) => {
                *count -= 1;
                let last = *count == 0;
                if last {
                    inner.view_refs.remove(&(offset, size));
                }
                last
            }
            None => true,
        }
    }
}

/// Verify magic, header checksum, and the cell walk of a serialized hive
/// image without constructing a [`Hive`].
pub fn integrity_check(bytes: &[u8]) -> Result<(), HiveError> {
    if !magic_ok(bytes) {
        return Err(HiveError::InvalidSignature);
    }
    if bytes.len() < HEADER_SIZE {
        return Err(HiveError::Corrupt("image shorter than the header"));
    }
    if !verify_checksum(&bytes[..HEADER_SIZE]) {
        return Err(HiveError::ChecksumMismatch);
    }
    let header = HiveHeader::read_from(bytes).ok_or(HiveError::InvalidSignature)?;
    if header.total_size as usize != bytes.len() {
        return Err(HiveError::SizeMismatch);
    }
    Hive::scan_cells(bytes)?;
    Ok(())
}
