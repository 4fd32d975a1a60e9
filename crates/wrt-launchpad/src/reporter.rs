//! First-render status reporting from a launched instance to the daemon.
//!
//! The reporter classifies how long the first frame took. If nothing was
//! rendered within the delayed window it reports `Delayed`; shortly after the
//! first frame it reports `Finished` and closes the channel, which tells the
//! daemon the hand-off is consumed.
//!
//! Deadlines are explicit [`Instant`]s so the host loop owns all waiting:
//! call [`LaunchStatusReporter::tick`] from a `select!` branch, or
//! [`next_deadline`](LaunchStatusReporter::next_deadline) plus
//! [`fire_due`](LaunchStatusReporter::fire_due) when driving time manually.

use std::io::Write;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use wrt_core::LaunchStatus;

use crate::protocol;

/// Destination of status reports.
pub trait StatusSink {
    /// Deliver one status code.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if delivery failed.
    fn send(&mut self, status: LaunchStatus) -> std::io::Result<()>;

    /// Close the channel. No further sends follow.
    fn close(&mut self);
}

impl StatusSink for UnixStream {
    fn send(&mut self, status: LaunchStatus) -> std::io::Result<()> {
        protocol::write_status(self, status)
    }

    fn close(&mut self) {
        if let Err(e) = self.flush() {
            debug!(error = %e, "status channel flush failed");
        }
        if let Err(e) = self.shutdown(Shutdown::Both) {
            debug!(error = %e, "status channel already closed");
        }
    }
}

/// How far reporting has progressed. Each phase is reached at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    /// Nothing reported yet.
    NotStarted,
    /// `Delayed` was reported.
    Delayed,
    /// `Finished` was reported and the channel closed.
    Finished,
}

/// Reporter timer lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterTimers {
    /// Window for the first frame before `Delayed` is reported.
    pub delayed: Duration,
    /// Time between the first frame and the `Finished` report.
    pub finished: Duration,
}

impl Default for ReporterTimers {
    fn default() -> Self {
        Self {
            delayed: Duration::from_secs(5),
            finished: Duration::from_millis(350),
        }
    }
}

/// Client-side launch status timers.
#[derive(Debug)]
pub struct LaunchStatusReporter<S> {
    sink: Option<S>,
    phase: ReportPhase,
    timers: ReporterTimers,
    delayed_at: Option<Instant>,
    finished_at: Option<Instant>,
    first_frame_seen: bool,
}

impl<S: StatusSink> LaunchStatusReporter<S> {
    /// Start reporting: arms the delayed timer.
    ///
    /// Without a sink (cold launch) the timers still run but nothing is sent.
    #[must_use]
    pub fn start(sink: Option<S>, timers: ReporterTimers) -> Self {
        let delayed_at = Instant::now().checked_add(timers.delayed);
        Self {
            sink,
            phase: ReportPhase::NotStarted,
            timers,
            delayed_at,
            finished_at: None,
            first_frame_seen: false,
        }
    }

    /// First-frame callback: cancels a pending delayed timer and arms the
    /// finished timer. Later calls are ignored.
    pub fn first_frame_rendered(&mut self) {
        if self.first_frame_seen {
            return;
        }
        self.first_frame_seen = true;
        if self.delayed_at.take().is_some() {
            debug!("first frame before delayed timer, cancelled");
        }
        if self.phase != ReportPhase::Finished {
            self.finished_at = Instant::now().checked_add(self.timers.finished);
        }
    }

    /// Earliest armed deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.delayed_at, self.finished_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer whose deadline is at or before `now`.
    pub fn fire_due(&mut self, now: Instant) {
        if self.delayed_at.is_some_and(|at| at <= now) {
            self.delayed_at = None;
            if self.phase == ReportPhase::NotStarted {
                self.phase = ReportPhase::Delayed;
                info!("no frame rendered in time, reporting delayed launch");
                self.send(LaunchStatus::Delayed);
            }
        }
        if self.finished_at.is_some_and(|at| at <= now) {
            self.finished_at = None;
            self.phase = ReportPhase::Finished;
            self.send(LaunchStatus::Finished);
            if let Some(mut sink) = self.sink.take() {
                sink.close();
            }
        }
    }

    /// Wait for the next deadline and fire it. Pends forever when nothing is
    /// armed. Cancel-safe.
    pub async fn tick(&mut self) {
        match self.next_deadline() {
            Some(at) => {
                tokio::time::sleep_until(at).await;
                self.fire_due(Instant::now());
            },
            None => std::future::pending().await,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> ReportPhase {
        self.phase
    }

    /// Whether `Finished` has been reported.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.phase == ReportPhase::Finished
    }

    fn send(&mut self, status: LaunchStatus) {
        let Some(sink) = self.sink.as_mut() else {
            debug!(%status, "no status channel, report dropped");
            return;
        };
        if let Err(e) = sink.send(status) {
            warn!(%status, error = %e, "failed to report launch status");
        }
    }
}
