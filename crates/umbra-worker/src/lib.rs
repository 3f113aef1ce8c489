//! Worker daemon library.
//!
//! A worker owns one session's model state and serves commands over a
//! strict request/reply channel on a loopback port assigned by the manager.
//! The scientific computation plugs in through the command registry; this
//! crate ships the skeleton: the serve loop, the dispatch registry, and a
//! small in-memory parameter store.

pub mod commands;
pub mod server;

pub use commands::{CommandHandler, CommandRegistry, WorkerContext};
pub use server::serve;
