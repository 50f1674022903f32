use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::config::{DnsUpstream, HttpMethod, MonitorConfig};
use crate::error::{MonitorError, MonitorResult};
use crate::models::{CheckResult, CheckSet, ProbeDetail, ProbeKind, ProbeTarget, ThroughputSample};
use crate::reachability::{Reachability, select_backend};
use crate::throughput::{ProcNetDev, ThroughputMeter};

/// Produces one `CheckSet` per cycle. The loop driver is generic over this
/// so it can be driven by something other than live probes.
pub trait CheckSource: Send {
    fn collect(&mut self) -> impl Future<Output = MonitorResult<CheckSet>> + Send;
}

pub struct Prober {
    targets: Arc<[ProbeTarget]>,
    http_client: reqwest::Client,
    dns_resolver: TokioResolver,
    reachability: Box<dyn Reachability>,
    throughput: Option<ThroughputMeter>,
}

impl Prober {
    /// Wires the live backends described by the configuration.
    pub fn from_config(config: &MonitorConfig) -> MonitorResult<Self> {
        let reachability = select_backend(config.reachability_backend);
        let throughput = if config.throughput_enabled {
            match ProcNetDev::detect() {
                Some(source) => Some(ThroughputMeter::new(Box::new(source), config.interval())),
                None => {
                    info!("Interface counters unavailable on this platform, throughput disabled");
                    None
                }
            }
        } else {
            None
        };
        Self::new(config, reachability, throughput)
    }

    /// `throughput` is the capability flag: `None` means every sample is empty.
    pub fn new(
        config: &MonitorConfig,
        reachability: Box<dyn Reachability>,
        throughput: Option<ThroughputMeter>,
    ) -> MonitorResult<Self> {
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| MonitorError::Startup(format!("HTTP client: {}", e)))?;

        let dns_resolver = build_resolver(config.dns_upstream)?;

        info!(
            "Prober ready: {} targets, reachability via {}, throughput {}",
            config.probe_targets().len(),
            reachability.name(),
            if throughput.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            targets: config.probe_targets().into(),
            http_client,
            dns_resolver,
            reachability,
            throughput,
        })
    }

    /// Outbound-facing local address: a connected UDP socket makes the OS
    /// pick the route without sending anything.
    pub async fn probe_local_address(&self, target: &ProbeTarget) -> CheckResult {
        let attempt = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(target.host.as_str()).await?;
            socket.local_addr()
        };
        match tokio::time::timeout(target.timeout, attempt).await {
            Ok(Ok(addr)) if !addr.ip().is_unspecified() => {
                CheckResult::success(ProbeDetail::Address { ip: addr.ip() })
            }
            Ok(Ok(_)) => CheckResult::failure("no route to a public address"),
            Ok(Err(e)) => CheckResult::failure(e.to_string()),
            Err(_) => CheckResult::failure("local address lookup timed out"),
        }
    }

    pub async fn probe_reachability(&self, host: &str, timeout: Duration) -> CheckResult {
        self.reachability.echo(host, timeout).await
    }

    pub async fn resolve_name(&self, host: &str, timeout: Duration) -> CheckResult {
        match tokio::time::timeout(timeout, self.dns_resolver.lookup_ip(host)).await {
            Ok(Ok(lookup)) => {
                let addresses = dedup_preserving_order(lookup.iter());
                if addresses.is_empty() {
                    CheckResult::failure(format!("no addresses for {}", host))
                } else {
                    CheckResult::success(ProbeDetail::Resolved { addresses })
                }
            }
            Ok(Err(e)) => CheckResult::failure(e.to_string()),
            Err(_) => CheckResult::failure(format!("resolving {} timed out", host)),
        }
    }

    /// Any HTTP response counts: it proves transport and TLS both work.
    pub async fn probe_http(&self, target: &ProbeTarget) -> CheckResult {
        match self.send(target).await {
            Ok(status) => CheckResult::success(ProbeDetail::Http { status }),
            Err(e) => CheckResult::failure(e),
        }
    }

    /// Captive-portal semantics: only 200 and 204 pass.
    pub async fn probe_service(&self, target: &ProbeTarget) -> CheckResult {
        match self.send(target).await {
            Ok(status @ (200 | 204)) => CheckResult::success(ProbeDetail::Http { status }),
            Ok(status) => CheckResult::failure(format!("unexpected HTTP status {}", status)),
            Err(e) => CheckResult::failure(e),
        }
    }

    pub fn measure_throughput(&mut self) -> ThroughputSample {
        match self.throughput.as_mut() {
            Some(meter) => meter.measure(),
            None => ThroughputSample::default(),
        }
    }

    async fn send(&self, target: &ProbeTarget) -> Result<u16, String> {
        let method = match target.method {
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Get => reqwest::Method::GET,
        };
        debug!("{} {}", target.method.as_str(), target.url());
        let response = self
            .http_client
            .request(method, target.url())
            .timeout(target.timeout)
            .send()
            .await
            .map_err(|e| error_chain(&e))?;
        Ok(response.status().as_u16())
    }
}

impl CheckSource for Prober {
    async fn collect(&mut self) -> MonitorResult<CheckSet> {
        let targets = Arc::clone(&self.targets);

        let mut address = None;
        let mut dns = None;
        let mut primary_http = None;
        let mut reachability = BTreeMap::new();
        let mut services = BTreeMap::new();
        let mut throughput = ThroughputSample::default();

        for target in targets.iter() {
            match target.kind {
                ProbeKind::Address => address = Some(self.probe_local_address(target).await),
                ProbeKind::Reachability => {
                    let result = self.probe_reachability(&target.host, target.timeout).await;
                    reachability.insert(target.host.clone(), result);
                }
                ProbeKind::Dns => dns = Some(self.resolve_name(&target.host, target.timeout).await),
                ProbeKind::Http => primary_http = Some(self.probe_http(target).await),
                ProbeKind::Service => {
                    services.insert(target.url(), self.probe_service(target).await);
                }
                ProbeKind::Throughput => throughput = self.measure_throughput(),
            }
        }
        debug!("Collected {} reachability and {} service results", reachability.len(), services.len());

        let missing = || CheckResult::failure("probe not configured");
        Ok(CheckSet {
            address: address.unwrap_or_else(missing),
            reachability,
            dns: dns.unwrap_or_else(missing),
            primary_http: primary_http.unwrap_or_else(missing),
            services,
            throughput,
        })
    }
}

fn build_resolver(upstream: DnsUpstream) -> MonitorResult<TokioResolver> {
    let resolver = match upstream {
        DnsUpstream::System => TokioResolver::builder_tokio()
            .map_err(|e| MonitorError::Startup(format!("system DNS configuration: {}", e)))?
            .build(),
        DnsUpstream::Cloudflare => TokioResolver::builder_with_config(
            ResolverConfig::cloudflare(),
            TokioConnectionProvider::default(),
        )
        .build(),
        DnsUpstream::Google => {
            TokioResolver::builder_with_config(ResolverConfig::google(), TokioConnectionProvider::default())
                .build()
        }
    };
    info!("DNS resolver configured: {:?}", upstream);
    Ok(resolver)
}

/// Order of first appearance wins.
pub fn dedup_preserving_order(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut out: Vec<IpAddr> = Vec::new();
    for addr in addrs {
        if !out.contains(&addr) {
            out.push(addr);
        }
    }
    out
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
