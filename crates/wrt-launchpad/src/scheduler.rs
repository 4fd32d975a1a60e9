//! Warm pool scheduling.
//!
//! The scheduler keeps at most one warm candidate. A launch request goes to
//! the candidate when one is idle and otherwise to a freshly spawned process.
//! Once a candidate has been handed a request it is never reused: the slot is
//! released when the candidate reports `Finished`, disconnects, or exits, and
//! a replacement is spawned after a short delay.
//!
//! Replenishment is a single optional deadline. Scheduling while a deadline
//! is pending keeps the earlier one, so each consumed hand-off yields exactly
//! one new candidate no matter how many release signals arrive for it.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nix::unistd::Pid;
use tokio::net::UnixStream;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use wrt_core::{LaunchRequest, LaunchStatus, ResourceGroup, ResourceGroupManager};

use crate::error::{LaunchpadError, LaunchpadResult};
use crate::protocol::CandidateCodec;
use crate::spawner::{ChildExit, ProcessSpawner};

/// Lifecycle of the pooled candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    /// Spawned, not yet registered.
    Creating,
    /// Registered and waiting for a hand-off.
    WarmIdle,
    /// Serving a request; never reused.
    HandedOff,
    /// Reaped.
    Dead,
}

/// The pooled candidate as seen by the daemon.
#[derive(Debug)]
pub struct CandidateProcess {
    pid: Pid,
    worker_pid: Option<Pid>,
    status: CandidateStatus,
    used: bool,
    conn: Option<Framed<UnixStream, CandidateCodec>>,
}

impl CandidateProcess {
    fn creating(pid: Pid) -> Self {
        Self {
            pid,
            worker_pid: None,
            status: CandidateStatus::Creating,
            used: false,
            conn: None,
        }
    }

    /// Candidate pid.
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Worker pid announced at registration.
    #[must_use]
    pub fn worker_pid(&self) -> Option<Pid> {
        self.worker_pid
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> CandidateStatus {
        self.status
    }

    /// Whether a request was already handed to this candidate.
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used
    }

    fn is_registered(&self) -> bool {
        matches!(
            self.status,
            CandidateStatus::WarmIdle | CandidateStatus::HandedOff
        )
    }
}

/// Something the candidate connection produced.
#[derive(Debug)]
pub enum CandidateEvent {
    /// A status code arrived.
    Status {
        /// Candidate pid.
        pid: Pid,
        /// Raw code.
        code: i32,
    },
    /// The connection closed or failed.
    Hangup {
        /// Candidate pid.
        pid: Pid,
        /// Read error, if the close was not clean.
        error: Option<std::io::Error>,
    },
}

/// Pool timing and switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Keep a warm candidate at all.
    pub enabled: bool,
    /// Spawn a replacement anyway if a handed-off candidate never releases
    /// the slot.
    pub replenish_fallback: Duration,
    /// Delay before replacing a reaped candidate.
    pub respawn_delay: Duration,
    /// Upper bound on writing a hand-off.
    pub send_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            replenish_fallback: Duration::from_secs(10),
            respawn_delay: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
        }
    }
}

/// Daemon-side pool coordinator.
#[derive(Debug)]
pub struct ProcessPoolScheduler<S> {
    settings: PoolSettings,
    pool_available: bool,
    spawner: S,
    groups: ResourceGroupManager,
    candidate: Option<CandidateProcess>,
    replenish_at: Option<Instant>,
}

impl<S: ProcessSpawner> ProcessPoolScheduler<S> {
    /// Create a scheduler. No candidate is spawned until [`start`](Self::start).
    #[must_use]
    pub fn new(settings: PoolSettings, spawner: S, groups: ResourceGroupManager) -> Self {
        Self {
            settings,
            pool_available: true,
            spawner,
            groups,
            candidate: None,
            replenish_at: None,
        }
    }

    /// Schedule the first candidate.
    pub fn start(&mut self) {
        if self.pooling_active() {
            self.schedule_replenish(Duration::ZERO);
        } else {
            info!("warm pool disabled, every launch is a cold spawn");
        }
    }

    /// Whether hand-offs are possible at all.
    #[must_use]
    pub fn pooling_active(&self) -> bool {
        self.settings.enabled && self.pool_available
    }

    /// Stop pooling because the registration socket is unusable. Any
    /// candidate is forgotten and launches fall back to cold spawns.
    pub fn disable_pool(&mut self) {
        self.pool_available = false;
        self.replenish_at = None;
        if let Some(candidate) = self.candidate.take() {
            debug!(pid = candidate.pid.as_raw(), "dropping candidate, pool unavailable");
        }
    }

    /// Record a registering candidate.
    ///
    /// Ignored (and the connection dropped) when pooling is off or a
    /// registered candidate already holds the slot. Returns whether the
    /// candidate was accepted.
    pub fn register_candidate(
        &mut self,
        pid: Pid,
        worker_pid: Option<Pid>,
        stream: UnixStream,
    ) -> bool {
        if !self.pooling_active() {
            debug!(pid = pid.as_raw(), "pool inactive, ignoring registration");
            return false;
        }
        match &self.candidate {
            Some(existing) if existing.is_registered() => {
                debug!(
                    pid = pid.as_raw(),
                    existing = existing.pid.as_raw(),
                    "candidate slot occupied, ignoring registration"
                );
                return false;
            },
            Some(existing) if existing.pid != pid => {
                debug!(
                    pid = pid.as_raw(),
                    spawned = existing.pid.as_raw(),
                    "registration from a different pid than spawned"
                );
            },
            _ => {},
        }

        info!(
            pid = pid.as_raw(),
            worker_pid = worker_pid.map(Pid::as_raw),
            "candidate registered"
        );
        self.candidate = Some(CandidateProcess {
            pid,
            worker_pid,
            status: CandidateStatus::WarmIdle,
            used: false,
            conn: Some(Framed::new(stream, CandidateCodec)),
        });
        true
    }

    /// Route a request: hand it to the idle candidate when possible,
    /// otherwise spawn a process for it.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchpadError::Spawn`] only if the cold spawn fails.
    pub async fn dispatch(&mut self, request: LaunchRequest) -> LaunchpadResult<Pid> {
        if self.pooling_active() {
            if let Some(pid) = self.hand_off(&request).await {
                return Ok(pid);
            }
        }
        self.spawn_cold(&request)
    }

    async fn hand_off(&mut self, request: &LaunchRequest) -> Option<Pid> {
        let candidate = self
            .candidate
            .as_mut()
            .filter(|c| c.status == CandidateStatus::WarmIdle && !c.used)?;
        candidate.used = true;
        candidate.status = CandidateStatus::HandedOff;
        let (pid, worker_pid) = (candidate.pid, candidate.worker_pid);

        let sent = match candidate.conn.as_mut() {
            Some(conn) => {
                tokio::time::timeout(self.settings.send_timeout, conn.send(request.clone()))
                    .await
                    .unwrap_or_else(|_| {
                        Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "hand-off write timed out",
                        ))
                    })
            },
            None => Err(std::io::Error::from(std::io::ErrorKind::NotConnected)),
        };

        if let Err(e) = sent {
            let err = LaunchpadError::PoolProtocol(format!("hand-off to {pid} failed: {e}"));
            warn!(pid = pid.as_raw(), error = %err, "falling back to cold spawn");
            self.reap(pid);
            return None;
        }

        self.groups
            .move_best_effort(ResourceGroup::Foreground, pid, worker_pid);
        self.schedule_replenish(self.settings.replenish_fallback);
        info!(
            pid = pid.as_raw(),
            app_id = %request.app_id,
            kind = %request.kind,
            "handed off launch to warm candidate"
        );
        Some(pid)
    }

    fn spawn_cold(&mut self, request: &LaunchRequest) -> LaunchpadResult<Pid> {
        let pid = self
            .spawner
            .spawn_cold(request)
            .map_err(LaunchpadError::Spawn)?;
        info!(
            pid = pid.as_raw(),
            app_id = %request.app_id,
            kind = %request.kind,
            "cold spawned launch"
        );
        Ok(pid)
    }

    /// Release the candidate with `pid` and schedule a replacement.
    ///
    /// Unknown pids are ignored, so reaping twice is the same as reaping
    /// once. Returns whether a candidate was released.
    pub fn reap(&mut self, pid: Pid) -> bool {
        let Some(mut candidate) = self.candidate.take_if(|c| c.pid == pid) else {
            debug!(pid = pid.as_raw(), "reap of unknown candidate ignored");
            return false;
        };
        let previous = candidate.status;
        candidate.status = CandidateStatus::Dead;
        candidate.conn = None;
        info!(pid = pid.as_raw(), status = ?previous, "candidate reaped");
        self.schedule_replenish(self.settings.respawn_delay);
        true
    }

    fn schedule_replenish(&mut self, delay: Duration) {
        if !self.pooling_active() {
            return;
        }
        let Some(at) = Instant::now().checked_add(delay) else {
            return;
        };
        let at = self.replenish_at.map_or(at, |pending| pending.min(at));
        debug!(delay = ?at.saturating_duration_since(Instant::now()), "replenishment scheduled");
        self.replenish_at = Some(at);
    }

    /// Pending replenishment deadline.
    #[must_use]
    pub fn replenish_deadline(&self) -> Option<Instant> {
        self.replenish_at
    }

    /// Whether a replenishment is pending.
    #[must_use]
    pub fn replenish_pending(&self) -> bool {
        self.replenish_at.is_some()
    }

    /// Run a due replenishment: spawn a candidate if the slot is free.
    ///
    /// A handed-off candidate still holding the slot is released first.
    /// Spawning while a candidate is being created or is idle does nothing.
    pub fn replenish(&mut self) {
        self.replenish_at = None;
        if !self.pooling_active() {
            return;
        }

        match self.candidate.as_ref().map(|c| (c.pid, c.status)) {
            Some((pid, CandidateStatus::HandedOff)) => {
                info!(pid = pid.as_raw(), "handed-off candidate never released the slot");
                self.candidate = None;
            },
            Some((pid, status @ (CandidateStatus::Creating | CandidateStatus::WarmIdle))) => {
                debug!(pid = pid.as_raw(), ?status, "candidate already present, not spawning");
                return;
            },
            Some((_, CandidateStatus::Dead)) | None => {},
        }

        match self.spawner.spawn_candidate() {
            Ok(pid) => {
                debug!(pid = pid.as_raw(), "spawned candidate");
                self.candidate = Some(CandidateProcess::creating(pid));
            },
            Err(e) => {
                warn!(error = %e, "failed to spawn candidate, retrying later");
                self.schedule_replenish(self.settings.respawn_delay);
            },
        }
    }

    /// Wait for the next event on the candidate connection. Pends forever
    /// when no candidate is connected. Cancel-safe.
    pub async fn next_candidate_event(&mut self) -> CandidateEvent {
        let Some(candidate) = self.candidate.as_mut() else {
            return std::future::pending().await;
        };
        let pid = candidate.pid;
        let Some(conn) = candidate.conn.as_mut() else {
            return std::future::pending().await;
        };
        match conn.next().await {
            Some(Ok(code)) => CandidateEvent::Status { pid, code },
            Some(Err(e)) => CandidateEvent::Hangup { pid, error: Some(e) },
            None => CandidateEvent::Hangup { pid, error: None },
        }
    }

    /// Apply a candidate connection event.
    pub fn handle_candidate_event(&mut self, event: CandidateEvent) {
        match event {
            CandidateEvent::Status { pid, code } => self.on_status(pid, code),
            CandidateEvent::Hangup { pid, error } => self.on_hangup(pid, error),
        }
    }

    /// A status code from the candidate.
    pub fn on_status(&mut self, pid: Pid, code: i32) {
        match LaunchStatus::from_code(code) {
            Some(LaunchStatus::Delayed) => {
                warn!(pid = pid.as_raw(), "launch is slow to render its first frame");
            },
            Some(LaunchStatus::Finished) => {
                info!(pid = pid.as_raw(), "launch finished, releasing candidate slot");
                self.reap(pid);
            },
            None => {
                let err = LaunchpadError::PoolProtocol(format!("unknown status code {code}"));
                warn!(pid = pid.as_raw(), error = %err, "ignoring candidate status");
            },
        }
    }

    fn on_hangup(&mut self, pid: Pid, error: Option<std::io::Error>) {
        let status = self.candidate.as_ref().map(|c| c.status);
        match (status, error) {
            (_, Some(e)) => warn!(pid = pid.as_raw(), error = %e, "candidate connection failed"),
            (Some(CandidateStatus::HandedOff), None) => {
                debug!(pid = pid.as_raw(), "handed-off candidate closed its channel");
            },
            (_, None) => warn!(pid = pid.as_raw(), ?status, "candidate disconnected"),
        }
        self.reap(pid);
    }

    /// A process started by the spawner exited.
    pub fn on_child_exit(&mut self, exit: ChildExit) {
        if self.candidate.as_ref().is_some_and(|c| c.pid == exit.pid) {
            info!(pid = exit.pid.as_raw(), code = ?exit.code, "candidate process exited");
            self.reap(exit.pid);
        } else {
            debug!(pid = exit.pid.as_raw(), code = ?exit.code, "launched process exited");
        }
    }

    /// The pooled candidate, if any.
    #[must_use]
    pub fn candidate(&self) -> Option<&CandidateProcess> {
        self.candidate.as_ref()
    }

    /// Number of idle candidates (zero or one).
    #[must_use]
    pub fn idle_candidates(&self) -> usize {
        usize::from(
            self.candidate
                .as_ref()
                .is_some_and(|c| c.status == CandidateStatus::WarmIdle),
        )
    }

    /// The spawner.
    #[must_use]
    pub fn spawner(&self) -> &S {
        &self.spawner
    }
}
