//! Cell prefix encoding: an 8-byte `{size: i32, signature: u16, flags: u16}`
//! header followed by a variable-length payload, always 8-byte aligned.
//!
//! The signed size sentinel (negative = allocated, positive = free) is the
//! on-disk encoding and is format-defining, so it is retained verbatim at
//! the serialization boundary. In memory it is reconstructed into the
//! tagged [`CellState`] so the rest of the engine never juggles sign bits.

pub const PREFIX_SIZE: usize = 8;

/// Cell signature tags, little-endian 16-bit values per spec §3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Free,
    Key,
    Value,
    Subkeys,
    Data,
    Security,
    Unknown(u16),
}

impl Signature {
    pub const FREE: u16 = 0x0000;
    pub const KEY: u16 = 0x6B6E; // 'nk'
    pub const VALUE: u16 = 0x6B76; // 'vk'
    pub const SUBKEYS: u16 = 0x666C; // 'lf'
    pub const DATA: u16 = 0x6264; // 'db'
    pub const SECURITY: u16 = 0x6B73; // 'sk'

    pub fn from_raw(raw: u16) -> Self {
        match raw {
            Self::FREE => Signature::Free,
            Self::KEY => Signature::Key,
            Self::VALUE => Signature::Value,
            Self::SUBKEYS => Signature::Subkeys,
            Self::DATA => Signature::Data,
            Self::SECURITY => Signature::Security,
            other => Signature::Unknown(other),
        }
    }

    pub fn to_raw(self) -> u16 {
        match self {
            Signature::Free => Self::FREE,
            Signature::Key => Self::KEY,
            Signature::Value => Self::VALUE,
            Signature::Subkeys => Self::SUBKEYS,
            Signature::Data => Self::DATA,
            Signature::Security => Self::SECURITY,
            Signature::Unknown(raw) => raw,
        }
    }
}

/// Reconstructed in-memory cell state: the sign bit of the on-disk `size`
/// folded into a tag, the magnitude (including the 8-byte prefix) kept as
/// an unsigned total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Allocated(u32),
    Free(u32),
}

impl CellState {
    pub fn total_len(self) -> u32 {
        match self {
            CellState::Allocated(n) | CellState::Free(n) => n,
        }
    }

    pub fn is_free(self) -> bool {
        matches!(self, CellState::Free(_))
    }

    /// Encode back to the on-disk signed sentinel.
    pub fn to_signed(self) -> i32 {
        match self {
            CellState::Allocated(n) => -(n as i32),
            CellState::Free(n) => n as i32,
        }
    }

    pub fn from_signed(signed: i32) -> Self {
        if signed < 0 {
            CellState::Allocated((-signed) as u32)
        } else {
            CellState::Free(signed as u32)
        }
    }
}

/// A decoded cell prefix, as read off the wire at some offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPrefix {
    pub state: CellState,
    pub signature: Signature,
    pub flags: u16,
}

impl CellPrefix {
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PREFIX_SIZE {
            return None;
        }
        let size = i32::from_le_bytes(bytes[0..4].try_into().ok()?);
        let signature = u16::from_le_bytes(bytes[4..6].try_into().ok()?);
        let flags = u16::from_le_bytes(bytes[6..8].try_into().ok()?);
        Some(Self {
            state: CellState::from_signed(size),
            signature: Signature::from_raw(signature),
            flags,
        })
    }

    pub fn write_to(self, bytes: &mut [u8]) {
        assert!(bytes.len() >= PREFIX_SIZE);
        bytes[0..4].copy_from_slice(&self.state.to_signed().to_le_bytes());
        bytes[4..6].copy_from_slice(&self.signature.to_raw().to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
    }
}

/// Round a requested payload size up to the next multiple of 8.
pub fn align8(size: u32) -> u32 {
    (size + 7) & !7
}
