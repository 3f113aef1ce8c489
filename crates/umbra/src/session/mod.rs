//! Session core: port pool, worker processes, proxying, registry, manager.

pub mod manager;
pub mod orphans;
pub mod ports;
pub mod process;
pub mod proxy;
pub mod registry;
pub mod types;

pub use manager::{SessionManager, SessionSettings, WorkerCommand};
pub use orphans::{ProcessScanner, ScannedProcess, SysinfoScanner};
pub use ports::{PortPool, PortStatus};
pub use registry::SessionRegistry;
pub use types::{SessionInfo, SessionRecord, SessionState};
