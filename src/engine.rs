use chrono::{DateTime, Local, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

use crate::aggregator::classify;
use crate::config::MonitorConfig;
use crate::downtime::Session;
use crate::error::MonitorResult;
use crate::models::{CheckSet, Classification, CycleState, DowntimeInterval};
use crate::presenter::{ConsoleSummary, Presenter, StatusBoard};
use crate::prober::{CheckSource, Prober};
use crate::sinks::{EventLog, SessionGuard, SnapshotFile, mark_incomplete_previous_run};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Fixed-cadence driver: probe, classify, track, persist, present.
pub struct Monitor<S: CheckSource> {
    config: MonitorConfig,
    source: S,
    log: EventLog,
    snapshot: Option<SnapshotFile>,
    presenters: Vec<Box<dyn Presenter>>,
    session: Session,
    state: LoopState,
    cycle: u64,
}

impl<S: CheckSource> Monitor<S> {
    pub fn new(config: MonitorConfig, source: S, log: EventLog, snapshot: Option<SnapshotFile>) -> Self {
        Self {
            config,
            source,
            log,
            snapshot,
            presenters: Vec::new(),
            session: Session::start(),
            state: LoopState::Idle,
            cycle: 0,
        }
    }

    pub fn with_presenter(mut self, presenter: impl Presenter + 'static) -> Self {
        self.presenters.push(Box::new(presenter));
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Runs until `shutdown` fires. The guard's stop marker is written on
    /// every way out of here, unwinding included.
    pub async fn run(&mut self, guard: SessionGuard, shutdown: CancellationToken) {
        let interval = self.config.interval();
        self.session = Session::start();
        self.state = LoopState::Running;
        self.write_event(
            Level::INFO,
            &format!("NETWATCH LOOP START, interval={:.3}s", interval.as_secs_f64()),
        );
        info!(
            "Monitoring loop active since {}, interval {:.2}s",
            self.session.started_at().format("%H:%M:%S"),
            interval.as_secs_f64()
        );

        let mut next_start = Instant::now();
        while !shutdown.is_cancelled() {
            let state = self.run_cycle().await;
            self.deliver(&state);

            next_start = next_slot(next_start, interval, Instant::now());

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = sleep_until(next_start) => {}
            }
        }

        self.state = LoopState::Stopping;
        info!("Stop requested after {} cycles, closing session", self.cycle);
        guard.finish();
        self.state = LoopState::Stopped;
    }

    /// One isolated iteration. Errors and panics become an `InternalError` cycle.
    async fn run_cycle(&mut self) -> CycleState {
        self.cycle += 1;
        let cycle = self.cycle;
        let outcome = AssertUnwindSafe(self.evaluate(cycle)).catch_unwind().await;
        let message = match outcome {
            Ok(Ok(state)) => return state,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("cycle panicked: {}", panic_message(panic.as_ref())),
        };

        error!("Cycle #{} failed: {}", cycle, message);
        self.write_event(Level::ERROR, &message);
        let now = Utc::now();
        self.session.tracker.observe(Classification::InternalError, now);
        self.assemble(cycle, None, Classification::InternalError, Some(message), None, now)
    }

    async fn evaluate(&mut self, cycle: u64) -> MonitorResult<CycleState> {
        let checks = self.source.collect().await?;
        let classification = classify(&checks);
        let now = Utc::now();
        let closed = self.session.tracker.observe(classification, now);
        if let Some(interval) = &closed {
            info!("Link restored after {:.1}s of downtime", interval.duration_seconds);
            if let Err(e) = self.log.downtime(interval) {
                warn!("{}", e);
            }
        }
        Ok(self.assemble(cycle, Some(checks), classification, None, closed, now))
    }

    fn assemble(
        &self,
        cycle: u64,
        checks: Option<CheckSet>,
        classification: Classification,
        error: Option<String>,
        closed_downtime: Option<DowntimeInterval>,
        now: DateTime<Utc>,
    ) -> CycleState {
        let downtime = self.session.tracker.total_at(now);
        CycleState {
            timestamp: now.with_timezone(&Local),
            cycle,
            primary: self.config.primary.clone(),
            checks,
            classification,
            summary: classification.label(&self.config.primary.host),
            uptime_seconds: self.session.uptime().as_secs(),
            downtime_seconds: downtime.num_seconds().max(0) as u64,
            error,
            closed_downtime,
        }
    }

    /// Persistence then presentation. Every sink is best effort.
    fn deliver(&mut self, state: &CycleState) {
        if let Err(e) = self.log.status(state) {
            warn!("Skipping event log for cycle #{}: {}", state.cycle, e);
        }
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = snapshot.write(state) {
                warn!("Skipping status snapshot for cycle #{}: {}", state.cycle, e);
                self.write_event(Level::ERROR, &e.to_string());
            }
        }

        let label = state.summary.as_str();
        for presenter in self.presenters.iter_mut() {
            let shown = std::panic::catch_unwind(AssertUnwindSafe(|| presenter.present(state, label)));
            if let Err(panic) = shown {
                error!("Presenter panicked: {}", panic_message(panic.as_ref()));
            }
        }
    }

    fn write_event(&self, level: Level, message: &str) {
        if let Err(e) = self.log.write(level, message) {
            warn!("{}", e);
        }
    }
}

/// Next start on the `origin + k * interval` grid. Slots that already passed
/// during an overrun are skipped, not replayed.
fn next_slot(current: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = current + interval;
    if next < now {
        let step = interval.as_nanos().max(1);
        let behind = (now - next).as_nanos().div_ceil(step);
        let skipped = u32::try_from(behind).unwrap_or(u32::MAX);
        debug!("Cycle overran its slot, skipping {} slot(s)", skipped);
        next += interval.saturating_mul(skipped);
    }
    next
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Full startup path: stale-session check, log, probes, loop.
/// Fails only for startup problems; once the loop runs it ends on `shutdown`.
pub async fn run(config: MonitorConfig, shutdown: CancellationToken, board: Option<StatusBoard>) -> MonitorResult<()> {
    if let Some(stale) = mark_incomplete_previous_run(&config.log_dir) {
        warn!("Previous session in {} ended without a stop marker", stale.display());
    }

    let log = EventLog::create_in(&config.log_dir)?;
    info!("Event log: {}", log.path().display());
    let guard = log.begin_session(&config)?;

    let prober = match Prober::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            let _ = guard.log().error(&e.to_string());
            return Err(e);
        }
    };

    let snapshot = SnapshotFile::new(config.status_path());
    info!("Status snapshot: {}", snapshot.path().display());

    let mut monitor = Monitor::new(config, prober, log, Some(snapshot)).with_presenter(ConsoleSummary::new());
    if let Some(board) = board {
        monitor = monitor.with_presenter(board);
    }
    monitor.run(guard, shutdown).await;
    Ok(())
}
