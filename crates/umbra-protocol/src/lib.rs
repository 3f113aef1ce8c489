//! Wire protocol shared by the manager and its workers.
//!
//! Every exchange with a worker is one request line and one response line of
//! JSON over a loopback TCP connection, strict request/reply. The manager
//! treats the payload as opaque; these types exist so both sides agree on the
//! envelope shape and the framing.

pub mod envelope;
pub mod wire;

pub use envelope::{CommandRequest, Envelope};
