//! Stable status codes and per-component error types.
//!
//! Internal code propagates the rich, `thiserror`-derived error of its own
//! component with `?`; [`Status`] is the stable 32-bit-code contract at the
//! public API boundary (spec'd status taxonomy), and every component error
//! converts into it with `From`.

use thiserror::Error;

/// Stable 32-bit status codes. `Success` is always zero; the remaining
/// variants are listed in the order the design's status taxonomy assigns
/// them. `MailboxFull` and `BufferTooSmall` intentionally share a discriminant:
/// both describe "the destination had no room," one at the IPC layer and one
/// at the generic buffer layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    InvalidParameter,
    NotInitialized,
    AlreadyInitialized,
    InsufficientResources,
    AccessDenied,
    NotFound,
    NoMoreEntries,
    MailboxFull,
    Pending,
    Timeout,
    InvalidSignature,
    SizeMismatch,
    ChecksumMismatch,
    Corrupt,
    NotImplemented,
    NotSupported,
}

impl Status {
    pub const BUFFER_TOO_SMALL: Status = Status::MailboxFull;

    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Errors raised by the cell store (hive engine), §4.A.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HiveError {
    #[error("offset {0:#x} is outside the hive's allocated range")]
    InvalidOffset(u32),
    #[error("requested size exceeds a free or allocated cell's payload")]
    SizeMismatch,
    #[error("hive image exhausted: no cell large enough for the request")]
    InsufficientResources,
    #[error("cell at offset {0:#x} is free, not allocated")]
    NotAllocated(u32),
    #[error("signature magic mismatch")]
    InvalidSignature,
    #[error("header checksum does not verify")]
    ChecksumMismatch,
    #[error("cell walk over/undershot the hive image: {0}")]
    Corrupt(&'static str),
}

impl From<HiveError> for Status {
    fn from(e: HiveError) -> Self {
        match e {
            HiveError::InvalidOffset(_) => Status::InvalidParameter,
            HiveError::SizeMismatch => Status::SizeMismatch,
            HiveError::InsufficientResources => Status::InsufficientResources,
            HiveError::NotAllocated(_) => Status::InvalidParameter,
            HiveError::InvalidSignature => Status::InvalidSignature,
            HiveError::ChecksumMismatch => Status::ChecksumMismatch,
            HiveError::Corrupt(_) => Status::Corrupt,
        }
    }
}

/// Errors raised by the capability substrate, §4.B.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CapError {
    #[error("no free capability slot in the table")]
    NoSlot,
    #[error("capability index out of range or slot is free")]
    NotFound,
    #[error("derivation would add rights the source capability does not hold")]
    AccessDenied,
}

impl From<CapError> for Status {
    fn from(e: CapError) -> Self {
        match e {
            CapError::NoSlot => Status::InsufficientResources,
            CapError::NotFound => Status::NotFound,
            CapError::AccessDenied => Status::AccessDenied,
        }
    }
}

/// Errors raised by the IPC engine, §4.C.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    #[error("receiver's mailbox slot is occupied")]
    MailboxFull,
    #[error("receiver's mailbox is empty")]
    Empty,
    #[error("receiver thread does not exist")]
    NotFound,
    #[error("operation timed out before the deadline")]
    Timeout,
}

impl From<IpcError> for Status {
    fn from(e: IpcError) -> Self {
        match e {
            IpcError::MailboxFull => Status::MailboxFull,
            IpcError::Empty => Status::NoMoreEntries,
            IpcError::NotFound => Status::NotFound,
            IpcError::Timeout => Status::Timeout,
        }
    }
}

/// Errors raised by the process/thread kernel, §4.D.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    #[error("no free process table slot")]
    NoProcessSlot,
    #[error("no free thread table slot")]
    NoThreadSlot,
    #[error("process thread quota exhausted")]
    ThreadQuotaExceeded,
    #[error("process id does not exist")]
    NoSuchProcess,
    #[error("thread id does not exist")]
    NoSuchThread,
    #[error("memory collaborator could not satisfy the allocation")]
    NoMemory,
}

impl From<ProcError> for Status {
    fn from(e: ProcError) -> Self {
        match e {
            ProcError::NoProcessSlot
            | ProcError::NoThreadSlot
            | ProcError::ThreadQuotaExceeded
            | ProcError::NoMemory => Status::InsufficientResources,
            ProcError::NoSuchProcess | ProcError::NoSuchThread => Status::NotFound,
        }
    }
}

/// Errors raised by the scheduler, §4.E.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    #[error("no thread is currently running")]
    NoCurrentThread,
    #[error("referenced thread does not exist")]
    NoSuchThread,
}

impl From<SchedError> for Status {
    fn from(e: SchedError) -> Self {
        match e {
            SchedError::NoCurrentThread | SchedError::NoSuchThread => Status::NotFound,
        }
    }
}

/// Errors raised by the configuration facade, §4.G.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("path has no components")]
    EmptyPath,
    #[error(transparent)]
    Hive(#[from] HiveError),
    #[error("value type {found:?} does not match the requested {expected:?}")]
    TypeMismatch { expected: &'static str, found: &'static str },
    #[error("key does not exist: {0}")]
    NoSuchKey(String),
}

impl From<ConfigError> for Status {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::EmptyPath => Status::InvalidParameter,
            ConfigError::Hive(h) => h.into(),
            ConfigError::TypeMismatch { .. } => Status::InvalidParameter,
            ConfigError::NoSuchKey(_) => Status::NotFound,
        }
    }
}
