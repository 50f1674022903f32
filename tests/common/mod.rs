#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use netwatch::{CheckResult, CheckSet, CycleState, Presenter, ProbeDetail, ThroughputSample};
use tokio_util::sync::CancellationToken;

pub fn up(detail: ProbeDetail) -> CheckResult {
    CheckResult::success(detail)
}

pub fn down(msg: &str) -> CheckResult {
    CheckResult::failure(msg)
}

pub fn echo_ok() -> CheckResult {
    up(ProbeDetail::Echo { rtt_ms: Some(11.2) })
}

pub fn http_ok(status: u16) -> CheckResult {
    up(ProbeDetail::Http { status })
}

/// Address ok, both echo targets ok, DNS ok, primary and both services ok.
pub fn healthy_set() -> CheckSet {
    CheckSet {
        address: up(ProbeDetail::Address { ip: "10.0.0.7".parse().unwrap() }),
        reachability: BTreeMap::from([
            ("1.1.1.1".to_string(), echo_ok()),
            ("8.8.8.8".to_string(), echo_ok()),
        ]),
        dns: up(ProbeDetail::Resolved {
            addresses: vec!["162.159.140.245".parse().unwrap()],
        }),
        primary_http: http_ok(401),
        services: BTreeMap::from([
            ("http://cp.cloudflare.com/generate_204".to_string(), http_ok(204)),
            ("http://google.com/generate_204".to_string(), http_ok(204)),
        ]),
        throughput: ThroughputSample { in_bps: Some(2048.0), out_bps: Some(512.0) },
    }
}

/// Records every presented cycle and cancels the loop after `limit` cycles.
#[derive(Clone)]
pub struct StopAfter {
    pub limit: u64,
    pub token: CancellationToken,
    pub seen: Arc<Mutex<Vec<CycleState>>>,
}

impl StopAfter {
    pub fn new(limit: u64, token: CancellationToken) -> Self {
        Self { limit, token, seen: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn states(&self) -> Vec<CycleState> {
        self.seen.lock().unwrap().clone()
    }
}

impl Presenter for StopAfter {
    fn present(&mut self, state: &CycleState, _label: &str) {
        self.seen.lock().unwrap().push(state.clone());
        if state.cycle >= self.limit {
            self.token.cancel();
        }
    }
}
