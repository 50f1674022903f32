use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use crate::models::{CycleState, DowntimeInterval, LinkState};
use crate::utils::format_rate;

/// Receives every cycle after persistence. Rendering is up to the implementor.
pub trait Presenter: Send {
    fn present(&mut self, state: &CycleState, label: &str);
}

/// One log line per cycle plus a louder line whenever the link flips.
#[derive(Debug, Default)]
pub struct ConsoleSummary {
    last: Option<LinkState>,
}

impl ConsoleSummary {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Presenter for ConsoleSummary {
    fn present(&mut self, state: &CycleState, label: &str) {
        match &state.checks {
            Some(checks) => {
                let best_rtt = checks.reachability.values().filter_map(|r| r.rtt_ms()).reduce(f64::min);
                info!(
                    "#{} {} | http {} rtt {} | uptime {}s downtime {}s | in {} out {}",
                    state.cycle,
                    label,
                    checks.primary_http.status().map_or("-".to_string(), |s| s.to_string()),
                    best_rtt.map_or("-".to_string(), |ms| format!("{:.1}ms", ms)),
                    state.uptime_seconds,
                    state.downtime_seconds,
                    format_rate(checks.throughput.in_bps),
                    format_rate(checks.throughput.out_bps)
                );
            }
            None => info!(
                "#{} {} | uptime {}s downtime {}s",
                state.cycle, label, state.uptime_seconds, state.downtime_seconds
            ),
        }

        let Some(now) = state.classification.link_state() else {
            return;
        };
        match self.last.replace(now) {
            Some(prev) if prev != now => {
                let msg = format!("[CHANGE] link {} -> {}: {}", prev, now, label);
                if now == LinkState::Down { error!("{}", msg); } else { warn!("{}", msg); }
            }
            None if now == LinkState::Down => error!("[CHANGE] link starts DOWN: {}", label),
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct BoardState {
    pub latest: Option<CycleState>,
    pub downtime: Vec<DowntimeInterval>,
}

/// Shared latest-state view read by the status API.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<BoardState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<CycleState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).latest.clone()
    }

    pub fn downtime(&self) -> Vec<DowntimeInterval> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).downtime.clone()
    }
}

impl Presenter for StatusBoard {
    fn present(&mut self, state: &CycleState, _label: &str) {
        let mut board = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if let Some(interval) = &state.closed_downtime {
            board.downtime.push(interval.clone());
        }
        board.latest = Some(state.clone());
    }
}
