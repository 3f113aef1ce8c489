//! Session manager: orchestrates the port pool, worker processes, readiness
//! probing, the registry, and idle reclamation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info, warn};
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::audit::SessionObserver;
use crate::error::{SessionError, SessionResult};

use super::orphans::ProcessScanner;
use super::ports::{PortPool, PortStatus};
use super::process::WorkerHandle;
use super::proxy::WorkerClient;
use super::registry::SessionRegistry;
use super::types::{SessionInfo, SessionRecord, SessionState};

/// Timeouts governing session lifecycle operations. Read once at startup,
/// immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Inactivity span after which a session is reaped.
    pub idle_timeout: Duration,
    /// Reaper sweep cadence.
    pub reap_interval: Duration,
    /// Hard deadline for the readiness handshake.
    pub ready_timeout: Duration,
    /// Grace period before a worker is force-killed.
    pub terminate_timeout: Duration,
    /// Per-call deadline for forwarded commands.
    pub proxy_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
            reap_interval: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(30),
            terminate_timeout: Duration::from_secs(3),
            proxy_timeout: Duration::from_secs(300),
        }
    }
}

/// How to launch a worker. The reserved port is appended as the final
/// argument.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub binary: String,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Substring of a command line identifying worker processes, used for
    /// orphan reclamation.
    pub fn signature(&self) -> &str {
        &self.binary
    }
}

/// Orchestrates all session operations.
///
/// Owns its registry and port pool as injected-by-construction components,
/// so multiple managers (e.g. in tests) coexist without interference.
pub struct SessionManager {
    registry: SessionRegistry,
    ports: PortPool,
    worker: WorkerCommand,
    settings: SessionSettings,
    client: WorkerClient,
    observer: Arc<dyn SessionObserver>,
    scanner: Arc<dyn ProcessScanner>,
}

impl SessionManager {
    pub fn new(
        port_range: (u16, u16),
        worker: WorkerCommand,
        settings: SessionSettings,
        observer: Arc<dyn SessionObserver>,
        scanner: Arc<dyn ProcessScanner>,
    ) -> Arc<Self> {
        let (start, end) = port_range;
        info!("Port pool configured: {}-{} ({} ports)", start, end, end.saturating_sub(start));
        Arc::new(Self {
            registry: SessionRegistry::new(),
            ports: PortPool::new(start, end),
            client: WorkerClient::new(settings.proxy_timeout),
            worker,
            settings,
            observer,
            scanner,
        })
    }

    /// Start a new session: reserve a port, spawn a worker, wait for it to
    /// answer the readiness probe, then register it.
    ///
    /// Any failure unwinds every prior step (the port is released and the
    /// process killed) before the error is returned. No partial state is
    /// ever left in the registry.
    pub async fn start_session(&self, user_info: Option<Value>) -> SessionResult<SessionInfo> {
        let port = self.ports.reserve().ok_or(SessionError::Exhausted)?;
        let session_id = Uuid::new_v4().to_string();

        let handle = match WorkerHandle::spawn(&self.worker.binary, &self.worker.args, port) {
            Ok(handle) => handle,
            Err(e) => {
                self.ports.release(port);
                error!("Failed to spawn worker on port {}: {}", port, e);
                return Err(SessionError::Spawn(e.to_string()));
            }
        };

        if !self.client.wait_for_ready(port, self.settings.ready_timeout).await {
            warn!(
                "Worker on port {} not ready within {:?}, killing",
                port, self.settings.ready_timeout
            );
            let mut handle = handle;
            handle.shutdown(self.settings.terminate_timeout).await;
            self.ports.release(port);
            return Err(SessionError::ReadinessTimeout(self.settings.ready_timeout));
        }

        let pid = handle.pid().unwrap_or(0);
        let record = SessionRecord::new(session_id.clone(), port, Some(handle), user_info);
        record.set_state(SessionState::Ready).await;
        self.registry.insert(Arc::clone(&record)).await;
        self.observer
            .session_created(&session_id, port, record.created_at)
            .await;

        info!(
            "Started session {} on port {} (pid={})",
            session_id, port, pid
        );
        Ok(record.info().await)
    }

    /// Forward one command to a session's worker.
    ///
    /// The per-session lock is held across the exchange so a teardown cannot
    /// interleave. A proxy failure is surfaced to the caller but does not
    /// end the session; the worker may recover on its own.
    pub async fn forward_command(
        &self,
        session_id: &str,
        message: Value,
    ) -> SessionResult<Value> {
        let record = self
            .registry
            .get(session_id)
            .await
            .ok_or(SessionError::NotFound)?;

        let command_name = message
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let started = Instant::now();

        let result = {
            let _worker = record.worker.lock().await;
            if record.state().await != SessionState::Ready {
                return Err(SessionError::NotFound);
            }
            self.client.send(record.port, &message).await
        };
        let duration = started.elapsed();

        match result {
            Ok(response) => {
                record.touch().await;
                let success = response
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let error_message = if success {
                    None
                } else {
                    response
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };
                self.observer
                    .command_executed(
                        session_id,
                        &command_name,
                        success,
                        duration,
                        error_message.as_deref(),
                    )
                    .await;
                self.observer
                    .session_activity(session_id, record.last_activity().await)
                    .await;
                Ok(response)
            }
            Err(cause) => {
                warn!(
                    "Command '{}' to session {} failed: {}",
                    command_name, session_id, cause
                );
                self.observer
                    .command_executed(
                        session_id,
                        &command_name,
                        false,
                        duration,
                        Some(&cause.to_string()),
                    )
                    .await;
                Err(SessionError::Forward(cause))
            }
        }
    }

    /// End a session: terminate the worker, release the port, drop the
    /// registry entry.
    ///
    /// Idempotent: ending an already-ended or unknown session returns
    /// `NotFound`. The port is released unconditionally once the terminate
    /// sequence has run, whichever branch it took.
    pub async fn end_session(&self, session_id: &str, reason: &str) -> SessionResult<()> {
        let record = self
            .registry
            .get(session_id)
            .await
            .ok_or(SessionError::NotFound)?;

        {
            let mut worker = record.worker.lock().await;
            match record.state().await {
                SessionState::Terminating | SessionState::Terminated => {
                    // A concurrent teardown won the race for this record.
                    return Err(SessionError::NotFound);
                }
                SessionState::Starting | SessionState::Ready => {}
            }
            record.set_state(SessionState::Terminating).await;
            if let Some(handle) = worker.as_mut() {
                handle.shutdown(self.settings.terminate_timeout).await;
            }
            *worker = None;
            record.set_state(SessionState::Terminated).await;
        }

        self.ports.release(record.port);
        self.registry.remove(session_id).await;
        self.observer
            .session_destroyed(session_id, Utc::now(), reason)
            .await;

        info!("Ended session {} ({})", session_id, reason);
        Ok(())
    }

    /// Snapshot of all sessions. Runs the idle sweep first so stale
    /// sessions never appear as active.
    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        self.reap_idle().await;
        let mut infos = Vec::new();
        for record in self.registry.snapshot().await {
            infos.push(record.info().await);
        }
        infos
    }

    pub async fn get_session(&self, session_id: &str) -> SessionResult<SessionInfo> {
        match self.registry.get(session_id).await {
            Some(record) => Ok(record.info().await),
            None => Err(SessionError::NotFound),
        }
    }

    /// Replace a session's user-info bag.
    pub async fn update_user_info(
        &self,
        session_id: &str,
        info: Value,
    ) -> SessionResult<SessionInfo> {
        let record = self
            .registry
            .get(session_id)
            .await
            .ok_or(SessionError::NotFound)?;
        record.set_user_info(Some(info)).await;
        record.touch().await;
        self.observer
            .session_activity(session_id, record.last_activity().await)
            .await;
        Ok(record.info().await)
    }

    pub fn port_status(&self) -> PortStatus {
        self.ports.status()
    }

    /// End every session past the idle threshold. Errors ending one session
    /// do not stop the sweep. Returns the number of sessions reaped.
    pub async fn reap_idle(&self) -> usize {
        let now = Utc::now();
        let mut expired = Vec::new();
        for record in self.registry.snapshot().await {
            let idle = now
                .signed_duration_since(record.last_activity().await)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle > self.settings.idle_timeout {
                info!(
                    "Session {} idle for {}s, shutting down",
                    record.session_id,
                    idle.as_secs()
                );
                expired.push(record.session_id.clone());
            }
        }

        let mut reaped = 0;
        for session_id in expired {
            match self.end_session(&session_id, "idle_timeout").await {
                Ok(()) => reaped += 1,
                // NotFound here means someone ended it while we swept.
                Err(SessionError::NotFound) => {}
                Err(e) => warn!("Failed to reap idle session {}: {}", session_id, e),
            }
        }
        reaped
    }

    /// Spawn the periodic idle-session reaper for the lifetime of the
    /// manager.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        info!(
            "Starting idle session reaper (every {:?}, timeout {:?})",
            manager.settings.reap_interval, manager.settings.idle_timeout
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.settings.reap_interval);
            // The first tick fires immediately; skip it so a fresh manager
            // does not sweep before anything could possibly be idle.
            interval.tick().await;
            loop {
                interval.tick().await;
                let reaped = manager.reap_idle().await;
                if reaped > 0 {
                    info!("Reaped {} idle session(s)", reaped);
                }
            }
        })
    }

    /// Terminate worker processes left over from a previous manager run.
    ///
    /// Run once at startup, before any session exists: every process whose
    /// command line matches the worker signature and that we do not own is
    /// an orphan holding a port. Returns the number reclaimed.
    pub fn reclaim_orphans(&self) -> usize {
        let signature = self.worker.signature();
        let own_pid = std::process::id();
        let mut reclaimed = 0;

        for process in self.scanner.scan(signature) {
            if process.pid == own_pid || process.parent == Some(own_pid) {
                continue;
            }
            warn!(
                "Found orphaned worker process (pid {}), terminating",
                process.pid
            );
            if self.scanner.terminate(process.pid) {
                reclaimed += 1;
            } else {
                warn!("Could not terminate orphaned worker (pid {})", process.pid);
            }
        }

        if reclaimed > 0 {
            info!("Cleaned up {} orphaned worker process(es)", reclaimed);
        }
        reclaimed
    }

    /// Tear down every session, best-effort. Called during manager
    /// shutdown; guarantees all ports are released before the process
    /// exits. Returns the number of sessions ended.
    pub async fn shutdown_all(&self) -> usize {
        let records = self.registry.snapshot().await;
        if records.is_empty() {
            info!("No active sessions to shut down");
            return 0;
        }

        info!("Shutting down {} active session(s)", records.len());
        let mut ended = 0;
        for record in records {
            match self.end_session(&record.session_id, "server_shutdown").await {
                Ok(()) => ended += 1,
                Err(SessionError::NotFound) => {}
                Err(e) => {
                    error!("Error shutting down session {}: {}", record.session_id, e);
                }
            }
        }
        ended
    }

    /// Number of registered sessions (idle sweep not applied).
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    #[cfg(test)]
    pub(crate) async fn insert_for_test(&self, record: Arc<SessionRecord>) {
        record.set_state(SessionState::Ready).await;
        self.registry.insert(record).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullObserver;
    use crate::error::ProxyError;
    use crate::session::orphans::ScannedProcess;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;
    use umbra_protocol::{CommandRequest, Envelope, wire};

    // ========================================================================
    // Fakes
    // ========================================================================

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionObserver for RecordingObserver {
        async fn session_created(&self, session_id: &str, port: u16, _created_at: DateTime<Utc>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("created {} {}", session_id, port));
        }

        async fn session_destroyed(
            &self,
            session_id: &str,
            _destroyed_at: DateTime<Utc>,
            reason: &str,
        ) {
            self.events
                .lock()
                .unwrap()
                .push(format!("destroyed {} {}", session_id, reason));
        }

        async fn session_activity(&self, _session_id: &str, _at: DateTime<Utc>) {}

        async fn command_executed(
            &self,
            _session_id: &str,
            command: &str,
            success: bool,
            _duration: Duration,
            _error: Option<&str>,
        ) {
            self.events
                .lock()
                .unwrap()
                .push(format!("command {} {}", command, success));
        }
    }

    struct FakeScanner {
        processes: Vec<ScannedProcess>,
        terminated: Mutex<Vec<u32>>,
    }

    impl FakeScanner {
        fn new(processes: Vec<ScannedProcess>) -> Self {
            Self {
                processes,
                terminated: Mutex::new(Vec::new()),
            }
        }

        fn empty() -> Self {
            Self::new(Vec::new())
        }
    }

    impl ProcessScanner for FakeScanner {
        fn scan(&self, signature: &str) -> Vec<ScannedProcess> {
            self.processes
                .iter()
                .filter(|p| p.cmdline.contains(signature))
                .cloned()
                .collect()
        }

        fn terminate(&self, pid: u32) -> bool {
            self.terminated.lock().unwrap().push(pid);
            true
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn quick_settings() -> SessionSettings {
        SessionSettings {
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(5),
            terminate_timeout: Duration::from_secs(1),
            proxy_timeout: Duration::from_secs(2),
        }
    }

    fn manager_with(
        range: (u16, u16),
        worker: WorkerCommand,
        settings: SessionSettings,
        observer: Arc<dyn SessionObserver>,
        scanner: Arc<dyn ProcessScanner>,
    ) -> Arc<SessionManager> {
        SessionManager::new(range, worker, settings, observer, scanner)
    }

    fn sleep_worker() -> WorkerCommand {
        // `sleep 600 <port>` just stays alive; it never answers a probe.
        WorkerCommand {
            binary: "/bin/sleep".to_string(),
            args: vec!["600".to_string()],
        }
    }

    /// A loopback task that speaks the worker protocol: answers `ping` with
    /// a ready envelope and echoes any other command back.
    async fn spawn_fake_worker(port: u16) {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let (read_half, mut write_half) = stream.into_split();
                let mut reader = BufReader::new(read_half);
                while let Ok(Some(request)) =
                    wire::read_message::<_, CommandRequest>(&mut reader).await
                {
                    let response = match request.command.as_str() {
                        "ping" => Envelope::ok(json!({"status": "ready"})),
                        other => Envelope::ok(json!({"echo": other})),
                    };
                    if wire::write_message(&mut write_half, &response).await.is_err() {
                        break;
                    }
                }
            }
        });
    }

    // ========================================================================
    // Start / forward / end
    // ========================================================================

    #[tokio::test]
    async fn exhausted_pool_rejects_before_spawning() {
        let manager = manager_with(
            (19300, 19300),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        let err = manager.start_session(None).await.unwrap_err();
        assert!(matches!(err, SessionError::Exhausted));
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_port() {
        let manager = manager_with(
            (19310, 19312),
            WorkerCommand {
                binary: "/nonexistent/umbra-worker".to_string(),
                args: Vec::new(),
            },
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        let err = manager.start_session(None).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(_)));

        let status = manager.port_status();
        assert_eq!(status.available, status.total);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn unready_worker_times_out_and_unwinds() {
        let mut settings = quick_settings();
        settings.ready_timeout = Duration::from_millis(800);
        let manager = manager_with(
            (19320, 19322),
            sleep_worker(),
            settings,
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );

        let err = manager.start_session(None).await.unwrap_err();
        assert!(matches!(err, SessionError::ReadinessTimeout(_)));

        let status = manager.port_status();
        assert_eq!(status.available, status.total);
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn start_forward_end_happy_path() {
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(
            (19330, 19333),
            sleep_worker(),
            quick_settings(),
            observer.clone(),
            Arc::new(FakeScanner::empty()),
        );

        // The pool hands out the lowest free port, so the fake worker can
        // listen there before the manager probes it.
        spawn_fake_worker(19330).await;

        let info = manager.start_session(Some(json!({"name": "Vega"}))).await.unwrap();
        assert_eq!(info.port, 19330);
        assert_eq!(info.state, SessionState::Ready);
        assert_eq!(manager.port_status().reserved, 1);

        let before = info.last_activity;
        let response = manager
            .forward_command(&info.session_id, json!({"command": "get_value"}))
            .await
            .unwrap();
        assert_eq!(response.get("success"), Some(&json!(true)));

        let after = manager.get_session(&info.session_id).await.unwrap();
        assert!(after.last_activity >= before);

        manager.end_session(&info.session_id, "manual").await.unwrap();
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(manager.port_status().available, 3);

        let events = observer.events();
        assert!(events.iter().any(|e| e.starts_with("created")));
        assert!(events.contains(&"command get_value true".to_string()));
        assert!(events.iter().any(|e| e.ends_with("manual")));
    }

    #[tokio::test]
    async fn end_session_is_idempotent() {
        let manager = manager_with(
            (19340, 19342),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        spawn_fake_worker(19340).await;

        let info = manager.start_session(None).await.unwrap();
        assert!(manager.end_session(&info.session_id, "manual").await.is_ok());
        assert_eq!(manager.port_status().available, 2);

        let err = manager
            .end_session(&info.session_id, "manual")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
        // The port was released exactly once.
        assert_eq!(manager.port_status().available, 2);
    }

    #[tokio::test]
    async fn forward_to_unknown_session_is_not_found() {
        let manager = manager_with(
            (19350, 19352),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        let err = manager
            .forward_command("no-such-session", json!({"command": "ping"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound));
        assert_eq!(manager.port_status().reserved, 0);
    }

    #[tokio::test]
    async fn dead_worker_surfaces_unreachable_but_session_stays() {
        let manager = manager_with(
            (19360, 19362),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );

        // No listener on the session's port: the worker is "dead".
        let record = SessionRecord::new("wedged".to_string(), 19361, None, None);
        manager.insert_for_test(record).await;

        let err = manager
            .forward_command("wedged", json!({"command": "ping"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Forward(ProxyError::Unreachable { .. })
        ));
        // Not auto-removed; it stays until ended or idle-reaped.
        assert_eq!(manager.session_count().await, 1);
    }

    // ========================================================================
    // Reaping and shutdown
    // ========================================================================

    #[tokio::test]
    async fn idle_sessions_are_reaped_and_ports_freed() {
        let mut settings = quick_settings();
        settings.idle_timeout = Duration::from_millis(50);
        let manager = manager_with(
            (19370, 19373),
            sleep_worker(),
            settings,
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        spawn_fake_worker(19370).await;

        let info = manager.start_session(None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // list_sessions runs the sweep first; the stale session never shows.
        let listed = manager.list_sessions().await;
        assert!(listed.is_empty());
        assert!(matches!(
            manager.get_session(&info.session_id).await,
            Err(SessionError::NotFound)
        ));
        assert_eq!(manager.port_status().available, 3);
    }

    #[tokio::test]
    async fn active_sessions_survive_the_sweep() {
        let mut settings = quick_settings();
        settings.idle_timeout = Duration::from_secs(60);
        let manager = manager_with(
            (19380, 19382),
            sleep_worker(),
            settings,
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        spawn_fake_worker(19380).await;

        let info = manager.start_session(None).await.unwrap();
        assert_eq!(manager.reap_idle().await, 0);
        assert!(manager.get_session(&info.session_id).await.is_ok());
    }

    #[tokio::test]
    async fn shutdown_all_drains_registry_and_ports() {
        let observer = Arc::new(RecordingObserver::default());
        let manager = manager_with(
            (19390, 19394),
            sleep_worker(),
            quick_settings(),
            observer.clone(),
            Arc::new(FakeScanner::empty()),
        );
        spawn_fake_worker(19390).await;
        spawn_fake_worker(19391).await;
        spawn_fake_worker(19392).await;

        for _ in 0..3 {
            manager.start_session(None).await.unwrap();
        }
        assert_eq!(manager.session_count().await, 3);

        let ended = manager.shutdown_all().await;
        assert_eq!(ended, 3);
        assert_eq!(manager.session_count().await, 0);
        assert_eq!(manager.port_status().reserved, 0);

        let reasons: Vec<String> = observer
            .events()
            .into_iter()
            .filter(|e| e.starts_with("destroyed"))
            .collect();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().all(|e| e.ends_with("server_shutdown")));
    }

    #[tokio::test]
    async fn shutdown_all_with_no_sessions_is_zero() {
        let manager = manager_with(
            (19400, 19402),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        assert_eq!(manager.shutdown_all().await, 0);
    }

    // ========================================================================
    // Port exhaustion scenario
    // ========================================================================

    #[tokio::test]
    async fn pool_exhaustion_and_reuse() {
        let manager = manager_with(
            (19410, 19413),
            sleep_worker(),
            quick_settings(),
            Arc::new(NullObserver),
            Arc::new(FakeScanner::empty()),
        );
        spawn_fake_worker(19410).await;
        spawn_fake_worker(19411).await;
        spawn_fake_worker(19412).await;

        let mut sessions = Vec::new();
        for _ in 0..3 {
            sessions.push(manager.start_session(None).await.unwrap());
        }
        assert_eq!(manager.port_status().available, 0);

        let err = manager.start_session(None).await.unwrap_err();
        assert!(matches!(err, SessionError::Exhausted));

        manager
            .end_session(&sessions[0].session_id, "manual")
            .await
            .unwrap();
        assert_eq!(manager.port_status().available, 1);

        // The freed port (the lowest) is reused.
        let reused = manager.start_session(None).await.unwrap();
        assert_eq!(reused.port, sessions[0].port);
    }

    // ========================================================================
    // Orphan reclamation
    // ========================================================================

    #[tokio::test]
    async fn reclaims_matching_processes_only() {
        let own_pid = std::process::id();
        let scanner = Arc::new(FakeScanner::new(vec![
            ScannedProcess {
                pid: 4001,
                parent: Some(1),
                cmdline: "/usr/bin/umbra-worker 9007".to_string(),
            },
            ScannedProcess {
                pid: 4002,
                parent: Some(1),
                cmdline: "/usr/bin/umbra-worker 9008".to_string(),
            },
            // Our own child is not an orphan.
            ScannedProcess {
                pid: 4003,
                parent: Some(own_pid),
                cmdline: "/usr/bin/umbra-worker 9009".to_string(),
            },
            // Unrelated process never matches the signature.
            ScannedProcess {
                pid: 4004,
                parent: Some(1),
                cmdline: "/usr/bin/some-other-daemon".to_string(),
            },
        ]));

        let manager = manager_with(
            (19420, 19422),
            WorkerCommand {
                binary: "umbra-worker".to_string(),
                args: Vec::new(),
            },
            quick_settings(),
            Arc::new(NullObserver),
            scanner.clone(),
        );

        assert_eq!(manager.reclaim_orphans(), 2);
        assert_eq!(*scanner.terminated.lock().unwrap(), vec![4001, 4002]);
    }
}
