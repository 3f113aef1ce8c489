//! Process enumeration for orphaned-worker reclamation.
//!
//! A crash or hard restart of the manager loses the in-memory registry but
//! leaves worker processes running and holding ports. At startup the manager
//! scans the host process list for command lines matching the worker
//! signature and terminates anything it does not own.

use std::time::Duration;

use log::warn;
use sysinfo::{Pid, Signal, System};

/// A process found by a scan.
#[derive(Debug, Clone)]
pub struct ScannedProcess {
    pub pid: u32,
    pub parent: Option<u32>,
    pub cmdline: String,
}

/// Host process-list access, abstracted so reclamation is testable with a
/// fake.
pub trait ProcessScanner: Send + Sync {
    /// Processes whose command line contains `signature`.
    fn scan(&self, signature: &str) -> Vec<ScannedProcess>;

    /// Terminate a process: graceful signal, bounded wait, then force-kill.
    /// Returns whether the process is gone (an already-dead pid counts).
    fn terminate(&self, pid: u32) -> bool;
}

/// Production scanner backed by the host process table.
pub struct SysinfoScanner;

impl SysinfoScanner {
    /// How long a terminated process gets to exit before the hard kill.
    const TERM_GRACE: Duration = Duration::from_secs(2);
}

impl ProcessScanner for SysinfoScanner {
    fn scan(&self, signature: &str) -> Vec<ScannedProcess> {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.processes()
            .iter()
            .filter_map(|(pid, process)| {
                let cmdline = process.cmd().join(" ");
                cmdline.contains(signature).then(|| ScannedProcess {
                    pid: pid.as_u32(),
                    parent: process.parent().map(|p| p.as_u32()),
                    cmdline,
                })
            })
            .collect()
    }

    fn terminate(&self, pid: u32) -> bool {
        let mut sys = System::new();
        sys.refresh_processes();
        let Some(process) = sys.process(Pid::from_u32(pid)) else {
            return true; // already gone
        };

        if process.kill_with(Signal::Term).is_none() {
            // Platform without SIGTERM support; fall through to the hard kill.
            warn!("SIGTERM unsupported on this platform, force-killing {}", pid);
        }

        let deadline = std::time::Instant::now() + Self::TERM_GRACE;
        while std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
            sys.refresh_processes();
            if sys.process(Pid::from_u32(pid)).is_none() {
                return true;
            }
        }

        sys.refresh_processes();
        match sys.process(Pid::from_u32(pid)) {
            Some(process) => process.kill(),
            None => true,
        }
    }
}
