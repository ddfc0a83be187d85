//! Bit-exact hive header layout (spec §6).
//!
//! ```text
//! 0x00..0x04  magic            u32 LE  'regf' = 0x66676572
//! 0x04..0x08  seq_primary      u32 LE
//! 0x08..0x0C  seq_secondary    u32 LE
//! 0x0C..0x14  last_write_ts    u64 LE
//! 0x14..0x18  version_major    u32 LE
//! 0x18..0x1C  version_minor    u32 LE
//! 0x1C..0x20  format_type      u32 LE
//! 0x20..0x24  flags            u32 LE
//! 0x24..0x28  root_cell_offset u32 LE
//! 0x28..0x2C  total_size       u32 LE
//! 0x2C..0x30  checksum         u32 LE
//! 0x30..0x1000 reserved trailer (zeroed)
//! ```

pub const MAGIC: u32 = 0x6667_6572; // 'regf'
pub const HEADER_SIZE: usize = 4096;
pub const CURRENT_VERSION_MAJOR: u32 = 1;
pub const CURRENT_VERSION_MINOR: u32 = 0;

const OFF_MAGIC: usize = 0x00;
const OFF_SEQ_PRIMARY: usize = 0x04;
const OFF_SEQ_SECONDARY: usize = 0x08;
const OFF_TIMESTAMP: usize = 0x0C;
const OFF_VERSION_MAJOR: usize = 0x14;
const OFF_VERSION_MINOR: usize = 0x18;
const OFF_FORMAT_TYPE: usize = 0x1C;
const OFF_FLAGS: usize = 0x20;
const OFF_ROOT_CELL: usize = 0x24;
const OFF_TOTAL_SIZE: usize = 0x28;
const OFF_CHECKSUM: usize = 0x2C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiveHeader {
    pub seq_primary: u32,
    pub seq_secondary: u32,
    pub last_write_timestamp: u64,
    pub version_major: u32,
    pub version_minor: u32,
    pub format_type: u32,
    pub flags: u32,
    pub root_cell_offset: u32,
    pub total_size: u32,
    pub checksum: u32,
}

impl HiveHeader {
    pub fn new(total_size: u32) -> Self {
        Self {
            seq_primary: 0,
            seq_secondary: 0,
            last_write_timestamp: 0,
            version_major: CURRENT_VERSION_MAJOR,
            version_minor: CURRENT_VERSION_MINOR,
            format_type: 0,
            flags: 0,
            root_cell_offset: HEADER_SIZE as u32,
            total_size,
            checksum: 0,
        }
    }

    /// Serialize into a fixed 4096-byte header block, stamping the
    /// checksum last so the field it protects is itself correct on disk.
    pub fn write_to(&self, buf: &mut [u8]) {
        assert!(buf.len() >= HEADER_SIZE);
        buf[..HEADER_SIZE].fill(0);
        buf[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[OFF_SEQ_PRIMARY..OFF_SEQ_PRIMARY + 4].copy_from_slice(&self.seq_primary.to_le_bytes());
        buf[OFF_SEQ_SECONDARY..OFF_SEQ_SECONDARY + 4]
            .copy_from_slice(&self.seq_secondary.to_le_bytes());
        buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8]
            .copy_from_slice(&self.last_write_timestamp.to_le_bytes());
        buf[OFF_VERSION_MAJOR..OFF_VERSION_MAJOR + 4]
            .copy_from_slice(&self.version_major.to_le_bytes());
        buf[OFF_VERSION_MINOR..OFF_VERSION_MINOR + 4]
            .copy_from_slice(&self.version_minor.to_le_bytes());
        buf[OFF_FORMAT_TYPE..OFF_FORMAT_TYPE + 4].copy_from_slice(&self.format_type.to_le_bytes());
        buf[OFF_FLAGS..OFF_FLAGS + 4].copy_from_slice(&self.flags.to_le_bytes());
        buf[OFF_ROOT_CELL..OFF_ROOT_CELL + 4].copy_from_slice(&self.root_cell_offset.to_le_bytes());
        buf[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 4].copy_from_slice(&self.total_size.to_le_bytes());
        let checksum = compute_checksum(&buf[..HEADER_SIZE]);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let magic = u32::from_le_bytes(buf[OFF_MAGIC..OFF_MAGIC + 4].try_into().ok()?);
        if magic != MAGIC {
            return None;
        }
        Some(Self {
            seq_primary: u32::from_le_bytes(buf[OFF_SEQ_PRIMARY..OFF_SEQ_PRIMARY + 4].try_into().ok()?),
            seq_secondary: u32::from_le_bytes(
                buf[OFF_SEQ_SECONDARY..OFF_SEQ_SECONDARY + 4].try_into().ok()?,
            ),
            last_write_timestamp: u64::from_le_bytes(
                buf[OFF_TIMESTAMP..OFF_TIMESTAMP + 8].try_into().ok()?,
            ),
            version_major: u32::from_le_bytes(
                buf[OFF_VERSION_MAJOR..OFF_VERSION_MAJOR + 4].try_into().ok()?,
            ),
            version_minor: u32::from_le_bytes(
                buf[OFF_VERSION_MINOR..OFF_VERSION_MINOR + 4].try_into().ok()?,
            ),
            format_type: u32::from_le_bytes(
                buf[OFF_FORMAT_TYPE..OFF_FORMAT_TYPE + 4].try_into().ok()?,
            ),
            flags: u32::from_le_bytes(buf[OFF_FLAGS..OFF_FLAGS + 4].try_into().ok()?),
            root_cell_offset: u32::from_le_bytes(
                buf[OFF_ROOT_CELL..OFF_ROOT_CELL + 4].try_into().ok()?,
            ),
            total_size: u32::from_le_bytes(buf[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 4].try_into().ok()?),
            checksum: u32::from_le_bytes(buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].try_into().ok()?),
        })
    }
}

/// XOR-rotate-left checksum over the header as 32-bit words, treating the
/// checksum field itself as zero (spec §6). `header` must be at least
/// [`HEADER_SIZE`] bytes; only the first `HEADER_SIZE` bytes are consumed.
pub fn compute_checksum(header: &[u8]) -> u32 {
    debug_assert!(header.len() >= HEADER_SIZE);
    let mut c: u32 = 0;
    for (word_idx, chunk) in header[..HEADER_SIZE].chunks_exact(4).enumerate() {
        let offset = word_idx * 4;
        let word = if offset == OFF_CHECKSUM {
            0
        } else {
            u32::from_le_bytes(chunk.try_into().unwrap())
        };
        c = (c ^ word).rotate_left(1);
    }
    c
}

/// Verify the checksum stored at `OFF_CHECKSUM` against a fresh
/// computation over the rest of the header.
pub fn verify_checksum(header: &[u8]) -> bool {
    if header.len() < HEADER_SIZE {
        return false;
    }
    let stored = u32::from_le_bytes(header[OFF_CHECKSUM..OFF_CHECKSUM + 4].try_into().unwrap());
    compute_checksum(header) == stored
}

pub fn magic_ok(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && u32::from_le_bytes(bytes[0..4].try_into().unwrap()) == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_round_trips() {
        let mut buf = vec![0u8; HEADER_SIZE];
        let header = HiveHeader::new(65536);
        header.write_to(&mut buf);
        assert!(magic_ok(&buf));
        assert!(verify_checksum(&buf));
    }

    #[test]
    fn checksum_rejects_single_bit_flip_anywhere_in_header() {
        let mut buf = vec![0u8; HEADER_SIZE];
        HiveHeader::new(65536).write_to(&mut buf);
        for bit_offset in 0..HEADER_SIZE * 8 {
            let mut flipped = buf.clone();
            flipped[bit_offset / 8] ^= 1 << (bit_offset % 8);
            assert!(
                !verify_checksum(&flipped),
                "checksum should reject flipped bit {bit_offset}"
            );
        }
    }

    #[test]
    fn identity_edit_then_recompute_verifies() {
        let mut buf = vec![0u8; HEADER_SIZE];
        let mut header = HiveHeader::new(65536);
        header.write_to(&mut buf);
        header.flags = 0xDEAD_BEEF;
        header.write_to(&mut buf);
        assert!(verify_checksum(&buf));
    }
}
