use chrono::{DateTime, Local, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::{HttpMethod, PrimaryTarget, Scheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Address,
    Reachability,
    Dns,
    Http,
    Service,
    Throughput,
}

/// One configured check. Built from the config at startup and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub kind: ProbeKind,
    pub host: String,
    pub path: String,
    pub scheme: Scheme,
    pub method: HttpMethod,
    pub timeout: Duration,
}

/// Outbound-interface discovery only needs a routable public address.
pub const LOCAL_ADDRESS_PROBE: &str = "8.8.8.8:80";

impl ProbeTarget {
    fn bare(kind: ProbeKind, host: &str, timeout: Duration) -> Self {
        Self {
            kind,
            host: host.to_string(),
            path: String::new(),
            scheme: Scheme::Http,
            method: HttpMethod::Get,
            timeout,
        }
    }

    pub fn local_address(timeout: Duration) -> Self {
        Self::bare(ProbeKind::Address, LOCAL_ADDRESS_PROBE, timeout)
    }

    pub fn reachability(host: &str, timeout: Duration) -> Self {
        Self::bare(ProbeKind::Reachability, host, timeout)
    }

    pub fn dns(host: &str, timeout: Duration) -> Self {
        Self::bare(ProbeKind::Dns, host, timeout)
    }

    pub fn throughput() -> Self {
        Self::bare(ProbeKind::Throughput, "", Duration::ZERO)
    }

    /// `scheme://host/path`, the key services are reported under.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme.as_str(), self.host, self.path)
    }
}

/// Success payload of a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeDetail {
    Address { ip: IpAddr },
    Echo { rtt_ms: Option<f64> },
    Resolved { addresses: Vec<IpAddr> },
    Http { status: u16 },
}

/// Outcome of one probe. A failed probe is a value, never an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(flatten)]
    pub detail: Option<ProbeDetail>,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn success(detail: ProbeDetail) -> Self {
        Self { ok: true, detail: Some(detail), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { ok: false, detail: None, error: Some(error.into()) }
    }

    pub fn status(&self) -> Option<u16> {
        match self.detail {
            Some(ProbeDetail::Http { status }) => Some(status),
            _ => None,
        }
    }

    pub fn rtt_ms(&self) -> Option<f64> {
        match self.detail {
            Some(ProbeDetail::Echo { rtt_ms }) => rtt_ms,
            _ => None,
        }
    }
}

/// Interface byte rates. Both `None` on the first sample or when disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    pub in_bps: Option<f64>,
    pub out_bps: Option<f64>,
}

/// Every probe result of a single cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSet {
    pub address: CheckResult,
    pub reachability: BTreeMap<String, CheckResult>,
    pub dns: CheckResult,
    pub primary_http: CheckResult,
    pub services: BTreeMap<String, CheckResult>,
    pub throughput: ThroughputSample,
}

impl CheckSet {
    pub fn any_reachable(&self) -> bool {
        self.reachability.values().any(|r| r.ok)
    }

    /// True when no services are configured.
    pub fn all_services_ok(&self) -> bool {
        self.services.values().all(|r| r.ok)
    }
}

/// Per-cycle health verdict, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    NoLocalAddress,
    DnsFailure,
    PrimaryUnreachable,
    PrimaryConnectivityProblem,
    ReachabilityBlocked,
    Healthy,
    /// Synthetic verdict for a cycle that faulted before producing checks.
    InternalError,
}

impl Classification {
    /// `None` for `InternalError`: a faulted cycle says nothing about the network.
    pub fn link_state(&self) -> Option<LinkState> {
        match self {
            Classification::Healthy | Classification::ReachabilityBlocked => Some(LinkState::Up),
            Classification::InternalError => None,
            _ => Some(LinkState::Down),
        }
    }

    pub fn label(&self, primary_host: &str) -> String {
        match self {
            Classification::NoLocalAddress => "No active IP - network interface is offline".into(),
            Classification::DnsFailure => format!("DNS problem - could not resolve {}", primary_host),
            Classification::PrimaryUnreachable => {
                format!("HTTPS problem reaching {} - internet likely down", primary_host)
            }
            Classification::PrimaryConnectivityProblem => {
                format!("Problem connecting to {}", primary_host)
            }
            Classification::ReachabilityBlocked => {
                "Internet reachable - ICMP may be blocked".into()
            }
            Classification::Healthy => format!("OK - internet and {} reachable", primary_host),
            Classification::InternalError => "Problem: internal cycle error".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Up,
    Down,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Up => f.write_str("UP"),
            LinkState::Down => f.write_str("DOWN"),
        }
    }
}

/// A closed stretch of `Down` time. Only the downtime tracker creates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DowntimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl DowntimeInterval {
    pub(crate) fn closed(start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let end = now.max(start);
        let duration = end - start;
        Self {
            start,
            end,
            duration_seconds: duration.num_milliseconds() as f64 / 1000.0,
        }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Everything one loop iteration produced; persisted and rendered as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub timestamp: DateTime<Local>,
    pub cycle: u64,
    /// The host every verdict in this record refers to.
    pub primary: PrimaryTarget,
    #[serde(flatten)]
    pub checks: Option<CheckSet>,
    pub classification: Classification,
    pub summary: String,
    pub uptime_seconds: u64,
    pub downtime_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_downtime: Option<DowntimeInterval>,
}
