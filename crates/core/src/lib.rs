//! SIS kernel core: the capability/IPC substrate, the process/thread/
//! scheduler kernel, and the hive storage engine.
//!
//! Everything outside these three components — architecture-specific
//! context switching, the physical/virtual memory manager, device drivers,
//! the HAL, and ACPI/WMI discovery — is a declared collaborator interface
//! in [`collaborators`]. This crate is hosted (`std`) so the core logic can
//! be exercised with `cargo test` independent of any freestanding target;
//! a real deployment wires [`collaborators::ArchOps`], [`collaborators::MemOps`]
//! and [`collaborators::HalOps`] to the actual architecture layer.

pub mod cap;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod fastpath;
pub mod hive;
pub mod ipc;
pub mod kernel;
pub mod process;
pub mod registry;
pub mod sched;

pub use error::Status;
pub use kernel::Kernel;
