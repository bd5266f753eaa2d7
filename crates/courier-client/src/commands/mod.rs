//! User-facing operations on [`App`](crate::App).
//!
//! Each sub-module groups related commands by domain. Every command
//! validates its input first, then mutates the repositories, then writes
//! the affected entity file. A failed write is returned to the caller but
//! the in-memory change stays applied.

pub mod account;
pub mod messaging;
pub mod settings;
pub mod social;
