use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use crate::models::{ProbeKind, ProbeTarget};

pub const MIN_INTERVAL_SECS: f64 = 0.5;
pub const MIN_REACHABILITY_TIMEOUT_SECS: f64 = 0.2;
pub const MIN_HTTP_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;
pub const MAX_TIMEOUT_SECS: f64 = 3_600.0;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: f64,
    pub reachability_targets: Vec<String>,
    pub reachability_timeout_secs: f64,
    pub reachability_backend: ReachabilityBackend,
    pub primary: PrimaryTarget,
    pub http_timeout_secs: f64,
    pub service_timeout_secs: f64,
    pub services: Vec<ServiceEndpoint>,
    pub throughput_enabled: bool,
    pub dns_upstream: DnsUpstream,
    pub log_dir: PathBuf,
    pub status_file: Option<PathBuf>,
    pub api_port: Option<u16>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2.0,
            reachability_targets: vec!["1.1.1.1".into(), "8.8.8.8".into()],
            reachability_timeout_secs: 1.0,
            reachability_backend: ReachabilityBackend::System,
            primary: PrimaryTarget::default(),
            http_timeout_secs: 5.0,
            service_timeout_secs: 5.0,
            services: default_services(),
            throughput_enabled: true,
            dns_upstream: DnsUpstream::System,
            log_dir: PathBuf::from("netlog"),
            status_file: None,
            api_port: None,
        }
    }
}

fn default_services() -> Vec<ServiceEndpoint> {
    vec![
        ServiceEndpoint::new(Scheme::Http, "google.com", "/generate_204"),
        ServiceEndpoint::new(Scheme::Http, "cp.cloudflare.com", "/generate_204"),
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PrimaryTarget {
    pub host: String,
    pub path: String,
    pub scheme: Scheme,
    pub method: HttpMethod,
}

impl Default for PrimaryTarget {
    fn default() -> Self {
        Self {
            host: "api.openai.com".into(),
            path: "/v1/models".into(),
            scheme: Scheme::Https,
            method: HttpMethod::Head,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Head,
    Get,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Head => "HEAD",
            HttpMethod::Get => "GET",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReachabilityBackend {
    /// Shell out to the platform `ping` utility.
    System,
    /// Raw ICMP echo sockets (needs privileges on most systems).
    Icmp,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsUpstream {
    System,
    Cloudflare,
    Google,
}

/// A captive-portal style endpoint, written as `host/path` or `scheme://host/path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub path: String,
}

impl ServiceEndpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
            path: normalize_path(&path.into()),
        }
    }

    pub fn parse(raw: &str) -> MonitorResult<Self> {
        let raw = raw.trim();
        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "http" => (Scheme::Http, rest),
                "https" => (Scheme::Https, rest),
                other => {
                    return Err(MonitorError::Config(format!(
                        "unsupported scheme '{}' in service '{}'",
                        other, raw
                    )));
                }
            },
            None => (Scheme::Http, raw),
        };
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, format!("/{}", path)),
            None => (rest, "/".to_string()),
        };
        if host.is_empty() {
            return Err(MonitorError::Config(format!("service '{}' has no host", raw)));
        }
        Ok(Self::new(scheme, host, path))
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.host, self.path)
    }
}

impl TryFrom<String> for ServiceEndpoint {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceEndpoint> for String {
    fn from(value: ServiceEndpoint) -> Self {
        value.to_string()
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

impl MonitorConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(MonitorError::ConfigIo)?;
        let config: MonitorConfig = serde_json::from_str(&content)
            .map_err(|e| MonitorError::Config(format!("{}: {}", path.display(), e)))?;
        config.validated()
    }

    /// Applies the minimum floors and normalises the primary target.
    pub fn validated(mut self) -> MonitorResult<Self> {
        if !self.interval_secs.is_finite() {
            return Err(MonitorError::Config("interval_secs must be finite".into()));
        }
        self.interval_secs = self.interval_secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
        self.reachability_timeout_secs = bound_secs(self.reachability_timeout_secs, MIN_REACHABILITY_TIMEOUT_SECS);
        self.http_timeout_secs = bound_secs(self.http_timeout_secs, MIN_HTTP_TIMEOUT_SECS);
        self.service_timeout_secs = bound_secs(self.service_timeout_secs, MIN_HTTP_TIMEOUT_SECS);

        self.primary.host = self.primary.host.trim().to_string();
        if self.primary.host.is_empty() {
            return Err(MonitorError::Config("primary.host must not be empty".into()));
        }
        self.primary.path = normalize_path(&self.primary.path);
        self.reachability_targets.retain(|t| !t.trim().is_empty());
        Ok(self)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_secs)
    }

    pub fn status_path(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| self.log_dir.join("last_status.json"))
    }

    /// Expands the configuration into the ordered list of probes run each cycle.
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        let reach_timeout = Duration::from_secs_f64(self.reachability_timeout_secs);
        let http_timeout = Duration::from_secs_f64(self.http_timeout_secs);
        let service_timeout = Duration::from_secs_f64(self.service_timeout_secs);

        let mut targets = vec![ProbeTarget::local_address(http_timeout)];
        targets.extend(
            self.reachability_targets
                .iter()
                .map(|host| ProbeTarget::reachability(host, reach_timeout)),
        );
        targets.push(ProbeTarget::dns(&self.primary.host, http_timeout));
        targets.push(ProbeTarget {
            kind: ProbeKind::Http,
            host: self.primary.host.clone(),
            path: self.primary.path.clone(),
            scheme: self.primary.scheme,
            method: self.primary.method,
            timeout: http_timeout,
        });
        targets.extend(self.services.iter().map(|svc| ProbeTarget {
            kind: ProbeKind::Service,
            host: svc.host.clone(),
            path: svc.path.clone(),
            scheme: svc.scheme,
            method: HttpMethod::Get,
            timeout: service_timeout,
        }));
        if self.throughput_enabled {
            targets.push(ProbeTarget::throughput());
        }
        targets
    }
}

fn bound_secs(value: f64, floor: f64) -> f64 {
    if value.is_finite() { value.clamp(floor, MAX_TIMEOUT_SECS) } else { floor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_endpoint_parsing() {
        let svc = ServiceEndpoint::parse("google.com/generate_204").unwrap();
        assert_eq!(svc.scheme, Scheme::Http);
        assert_eq!(svc.host, "google.com");
        assert_eq!(svc.path, "/generate_204");

        let svc = ServiceEndpoint::parse("HTTPS://example.org").unwrap();
        assert_eq!(svc.scheme, Scheme::Https);
        assert_eq!(svc.path, "/");
        assert_eq!(svc.to_string(), "https://example.org/");

        assert!(ServiceEndpoint::parse("ftp://example.org/x").is_err());
        assert!(ServiceEndpoint::parse("/only-path").is_err());
    }

    #[test]
    fn validated_applies_floors() {
        let cfg = MonitorConfig {
            interval_secs: 0.1,
            reachability_timeout_secs: 0.0,
            http_timeout_secs: -3.0,
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.interval_secs, MIN_INTERVAL_SECS);
        assert_eq!(cfg.reachability_timeout_secs, MIN_REACHABILITY_TIMEOUT_SECS);
        assert_eq!(cfg.http_timeout_secs, MIN_HTTP_TIMEOUT_SECS);
    }

    #[test]
    fn validated_applies_ceilings() {
        let cfg = MonitorConfig {
            interval_secs: 1e300,
            reachability_timeout_secs: 2e19,
            http_timeout_secs: f64::MAX,
            service_timeout_secs: 7_200.0,
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(cfg.interval_secs, MAX_INTERVAL_SECS);
        assert_eq!(cfg.reachability_timeout_secs, MAX_TIMEOUT_SECS);
        assert_eq!(cfg.http_timeout_secs, MAX_TIMEOUT_SECS);
        assert_eq!(cfg.service_timeout_secs, MAX_TIMEOUT_SECS);

        // Converting to durations must not panic once bounded.
        assert_eq!(cfg.interval(), Duration::from_secs(86_400));
        assert!(cfg.probe_targets().iter().all(|t| t.timeout <= Duration::from_secs(3_600)));
    }

    #[test]
    fn validated_normalises_primary_and_rejects_empty_host() {
        let mut cfg = MonitorConfig::default();
        cfg.primary.path = "health".into();
        let cfg = cfg.validated().unwrap();
        assert_eq!(cfg.primary.path, "/health");

        let mut cfg = MonitorConfig::default();
        cfg.primary.host = "   ".into();
        assert!(cfg.validated().is_err());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{
            "interval_secs": 1,
            "services": ["https://cp.cloudflare.com/generate_204"],
            "primary": { "host": "example.com", "method": "GET" }
        }"#;
        let cfg: MonitorConfig = serde_json::from_str(json).unwrap();
        let cfg = cfg.validated().unwrap();
        assert_eq!(cfg.interval(), Duration::from_secs(1));
        assert_eq!(cfg.primary.host, "example.com");
        assert_eq!(cfg.primary.path, "/v1/models");
        assert_eq!(cfg.primary.method, HttpMethod::Get);
        assert_eq!(cfg.services.len(), 1);
        assert_eq!(cfg.services[0].scheme, Scheme::Https);
        assert_eq!(cfg.reachability_targets, vec!["1.1.1.1", "8.8.8.8"]);
        assert_eq!(cfg.status_path(), PathBuf::from("netlog").join("last_status.json"));
    }

    #[test]
    fn probe_targets_follow_configuration_order() {
        let mut cfg = MonitorConfig::default();
        cfg.throughput_enabled = false;
        let kinds: Vec<ProbeKind> = cfg.probe_targets().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProbeKind::Address,
                ProbeKind::Reachability,
                ProbeKind::Reachability,
                ProbeKind::Dns,
                ProbeKind::Http,
                ProbeKind::Service,
                ProbeKind::Service,
            ]
        );

        cfg.throughput_enabled = true;
        assert_eq!(cfg.probe_targets().last().map(|t| t.kind), Some(ProbeKind::Throughput));
    }
}
