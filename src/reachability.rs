//! Echo-style liveness checks behind a swappable capability.

use futures::future::{BoxFuture, FutureExt};
use std::io::ErrorKind;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use surge_ping::{Client as PingClient, Config as PingConfig, ICMP, PingIdentifier, PingSequence};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::ReachabilityBackend;
use crate::models::{CheckResult, ProbeDetail};

/// Extra wait on top of the echo timeout before the child process is killed.
const PROCESS_GRACE: Duration = Duration::from_secs(1);

/// Sends one echo request. Implementations never fail: an unusable facility
/// is reported as `ok=false`.
pub trait Reachability: Send + Sync {
    fn name(&self) -> &'static str;

    fn echo<'a>(&'a self, host: &'a str, timeout: Duration) -> BoxFuture<'a, CheckResult>;
}

pub fn select_backend(backend: ReachabilityBackend) -> Box<dyn Reachability> {
    match backend {
        ReachabilityBackend::System => Box::new(SystemPing::new()),
        ReachabilityBackend::Icmp => match IcmpEcho::new() {
            Ok(icmp) => {
                info!("ICMP echo backend active");
                Box::new(icmp)
            }
            Err(e) => {
                warn!("ICMP socket unavailable ({}), falling back to system ping", e);
                Box::new(SystemPing::new())
            }
        },
    }
}

/// Delegates to the platform `ping` utility, so no raw-socket privileges are needed.
#[derive(Debug, Clone)]
pub struct SystemPing {
    program: String,
}

impl Default for SystemPing {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPing {
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    #[cfg(windows)]
    fn args(host: &str, timeout: Duration) -> Vec<String> {
        vec!["-n".into(), "1".into(), "-w".into(), timeout.as_millis().to_string(), host.into()]
    }

    #[cfg(not(windows))]
    fn args(host: &str, timeout: Duration) -> Vec<String> {
        // -W takes whole seconds; 0 would mean "wait forever" on some builds.
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), host.into()]
    }

    async fn run(&self, host: &str, timeout: Duration) -> CheckResult {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout + PROCESS_GRACE, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return CheckResult::failure(format!("{} not found", self.program));
            }
            Ok(Err(e)) => return CheckResult::failure(e.to_string()),
            Err(_) => return CheckResult::failure("echo timed out"),
        };

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if output.status.success() {
            CheckResult::success(ProbeDetail::Echo { rtt_ms: parse_rtt_ms(&text) })
        } else {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                CheckResult::failure(match output.status.code() {
                    Some(code) => format!("{} exited with code {}", self.program, code),
                    None => format!("{} terminated by signal", self.program),
                })
            } else {
                CheckResult::failure(trimmed.to_string())
            }
        }
    }
}

impl Reachability for SystemPing {
    fn name(&self) -> &'static str {
        "system-ping"
    }

    fn echo<'a>(&'a self, host: &'a str, timeout: Duration) -> BoxFuture<'a, CheckResult> {
        self.run(host, timeout).boxed()
    }
}

/// Pulls the round-trip time out of ping output (`time=23.4 ms`, `time<1ms`).
pub fn parse_rtt_ms(output: &str) -> Option<f64> {
    let lower = output.to_ascii_lowercase();
    lower.match_indices("time").find_map(|(idx, _)| {
        let rest = &lower[idx + "time".len()..];
        let rest = rest.strip_prefix('=').or_else(|| rest.strip_prefix('<'))?;
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..end].parse().ok()?;
        rest[end..].trim_start().starts_with("ms").then_some(value)
    })
}

/// Raw ICMP echo through surge-ping. Creating the sockets needs privileges.
pub struct IcmpEcho {
    v4: PingClient,
    v6: Option<PingClient>,
}

const ICMP_PAYLOAD: [u8; 56] = [0u8; 56];

impl IcmpEcho {
    pub fn new() -> std::io::Result<Self> {
        let v4 = PingClient::new(&PingConfig::default())?;
        let v6 = PingClient::new(&PingConfig::builder().kind(ICMP::V6).build()).ok();
        Ok(Self { v4, v6 })
    }

    async fn run(&self, host: &str, timeout: Duration) -> CheckResult {
        let ip = match resolve_first(host).await {
            Ok(ip) => ip,
            Err(e) => return CheckResult::failure(e),
        };
        let client = match (ip, &self.v6) {
            (IpAddr::V4(_), _) => &self.v4,
            (IpAddr::V6(_), Some(v6)) => v6,
            (IpAddr::V6(_), None) => return CheckResult::failure("ICMPv6 socket unavailable"),
        };

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(0), &ICMP_PAYLOAD).await {
            Ok((_, rtt)) => CheckResult::success(ProbeDetail::Echo {
                rtt_ms: Some(rtt.as_secs_f64() * 1000.0),
            }),
            Err(e) => CheckResult::failure(e.to_string()),
        }
    }
}

impl Reachability for IcmpEcho {
    fn name(&self) -> &'static str {
        "icmp"
    }

    fn echo<'a>(&'a self, host: &'a str, timeout: Duration) -> BoxFuture<'a, CheckResult> {
        self.run(host, timeout).boxed()
    }
}

async fn resolve_first(host: &str) -> Result<IpAddr, String> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    match tokio::net::lookup_host((host, 0)).await {
        Ok(mut addrs) => addrs
            .next()
            .map(|sa| sa.ip())
            .ok_or_else(|| format!("no address found for {}", host)),
        Err(e) => Err(format!("resolution of {} failed: {}", host, e)),
    }
}
