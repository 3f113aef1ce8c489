//! Port pool for worker command channels.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;

use serde::Serialize;

/// Pool snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PortStatus {
    pub total: usize,
    pub reserved: usize,
    pub available: usize,
    pub reserved_ports: Vec<u16>,
    pub range: String,
}

struct PoolState {
    available: BTreeSet<u16>,
    reserved: HashSet<u16>,
}

/// Tracks which ports in the configured range are free vs. reserved.
///
/// The available and reserved sets partition the range at all times; a port
/// is reserved by at most one session.
pub struct PortPool {
    /// First port (inclusive).
    start: u16,
    /// End of range (exclusive).
    end: u16,
    state: Mutex<PoolState>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            state: Mutex::new(PoolState {
                available: (start..end).collect(),
                reserved: HashSet::new(),
            }),
        }
    }

    /// Reserve the lowest-numbered free port.
    ///
    /// Returns `None` when the range is exhausted; the caller must not spawn
    /// a worker in that case.
    pub fn reserve(&self) -> Option<u16> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let port = state.available.pop_first()?;
        state.reserved.insert(port);
        Some(port)
    }

    /// Release a port back to the pool.
    ///
    /// Idempotent: releasing an already-available or out-of-range port is a
    /// no-op, never an error.
    pub fn release(&self, port: u16) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.reserved.remove(&port) {
            state.available.insert(port);
        }
    }

    pub fn available_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.available.len()
    }

    pub fn status(&self) -> PortStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut reserved_ports: Vec<u16> = state.reserved.iter().copied().collect();
        reserved_ports.sort_unstable();
        PortStatus {
            total: (self.end - self.start) as usize,
            reserved: state.reserved.len(),
            available: state.available.len(),
            reserved_ports,
            range: format!("{}-{}", self.start, self.end.saturating_sub(1)),
        }
    }
}
