//! IPC engine: register-only messages, mailboxes, send/receive/post_receive.

pub mod engine;
pub mod mailbox;
pub mod message;

pub use engine::{post_receive, receive, send};
pub use mailbox::Mailbox;
pub use message::{Message, MAX_MESSAGE_REGS};
