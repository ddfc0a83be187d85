//! Refcounted windows onto a live [`Hive`]. A view is a caller-owned copy of
//! one cell's payload that writes back and flushes the hive when the last
//! reference over the same `(offset, size)` window is dropped and the copy
//! was mutated — the cheapest approximation of a zero-copy mapped window
//! that a `Mutex`-guarded byte buffer can offer without unsafe aliasing.
//!
//! When built with the `mapped-views` feature, [`Hive::open_mapped`] and
//! [`Hive::flush_to_file`] additionally let the whole image live on a
//! `memmap2`-backed file instead of only in the process heap.

use std::sync::Arc;

use super::store::Hive;
use crate::error::HiveError;

pub struct HiveView {
    hive: Arc<Hive>,
    offset: u32,
    size: u32,
    data: Vec<u8>,
    dirty: bool,
}

impl HiveView {
    pub(crate) fn new(hive: Arc<Hive>, offset: u32, size: u32) -> Result<Self, HiveError> {
        let data = hive.get(offset, size)?;
        hive.register_view(offset, size);
        Ok(Self {
            hive,
            offset,
            size,
            data,
            dirty: false,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Overwrite the view's local copy; written back to the hive only when
    /// the last outstanding reference to this window is dropped.
    pub fn set(&mut self, bytes: &[u8]) -> Result<(), HiveError> {
        if bytes.len() != self.data.len() {
            return Err(HiveError::SizeMismatch);
        }
        self.data.copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }
}

impl Drop for HiveView {
    fn drop(&mut self) {
        let last_ref = self.hive.release_view(self.offset, self.size);
        if last_ref && self.dirty {
            if self.hive.write(self.offset, &self.data).is_ok() {
                self.hive.flush();
            }
        }
    }
}

#[cfg(feature = "mapped-views")]
mod mapped {
    use std::fs::OpenOptions;
    use std::path::Path;

    use memmap2::{Mmap, MmapMut};

    use super::super::store::integrity_check;
    use super::Hive;
    use crate::error::HiveError;

    impl Hive {
        /// Load a hive image from a file via `memmap2`, copying it into the
        /// heap-backed representation after verifying it. The mapping
        /// itself is only used to avoid reading the file through a second
        /// buffered copy; the hive does not keep the mapping open.
        pub fn open_mapped(path: impl AsRef<Path>) -> Result<Self, HiveError> {
            let file = OpenOptions::new()
                .read(true)
                .open(path.as_ref())
                .map_err(|_| HiveError::InvalidSignature)?;
            let mmap = unsafe { Mmap::map(&file) }.map_err(|_| HiveError::InvalidSignature)?;
            integrity_check(&mmap)?;
            Hive::from_bytes(mmap.to_vec())
        }

        /// Flush the current image to `path`, overwriting it via a
        /// `memmap2` mapping sized to the serialized image.
        pub fn flush_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
            self.flush();
            let bytes = self.serialize();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path.as_ref())?;
            file.set_len(bytes.len() as u64)?;
            let mut mmap = unsafe { MmapMut::map_mut(&file)? };
            mmap.copy_from_slice(&bytes);
            mmap.flush()?;
            Ok(())
        }
    }
}
