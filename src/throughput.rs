//! Interface byte-rate sampling.
//!
//! Linux implementation via /proc/net/dev, summed over every interface.
//! Other platforms report the capability as unavailable and the prober
//! then publishes empty samples.

use std::fs;
use std::io;
use std::time::Duration;

use crate::models::ThroughputSample;

/// Cumulative counters across all interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCounters {
    pub received: u64,
    pub sent: u64,
}

pub trait CounterSource: Send + Sync {
    fn read(&mut self) -> io::Result<ByteCounters>;
}

/// `/proc/net/dev` reader.
#[derive(Debug, Default)]
pub struct ProcNetDev;

impl ProcNetDev {
    /// `None` when the platform has no /proc/net/dev.
    pub fn detect() -> Option<Self> {
        if cfg!(target_os = "linux") && fs::metadata("/proc/net/dev").is_ok() {
            Some(Self)
        } else {
            None
        }
    }
}

impl CounterSource for ProcNetDev {
    fn read(&mut self) -> io::Result<ByteCounters> {
        let content = fs::read_to_string("/proc/net/dev")?;
        parse_proc_net_dev(&content)
    }
}

/// Parses the kernel table:
/// `  eth0: <rx bytes> <rx packets> ... (8 rx cols) <tx bytes> ...`
pub fn parse_proc_net_dev(content: &str) -> io::Result<ByteCounters> {
    let mut totals = ByteCounters::default();
    let mut seen = 0usize;
    for line in content.lines() {
        let Some((_iface, stats)) = line.split_once(':') else {
            continue;
        };
        let cols: Vec<&str> = stats.split_whitespace().collect();
        if cols.len() < 9 {
            continue;
        }
        let parse = |s: &str| {
            s.parse::<u64>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad counter '{}': {}", s, e)))
        };
        totals.received = totals.received.saturating_add(parse(cols[0])?);
        totals.sent = totals.sent.saturating_add(parse(cols[8])?);
        seen += 1;
    }
    if seen == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "no interfaces in /proc/net/dev"));
    }
    Ok(totals)
}

/// Turns successive counter reads into per-second rates over the configured interval.
pub struct ThroughputMeter {
    source: Box<dyn CounterSource>,
    interval: Duration,
    last: Option<ByteCounters>,
}

impl ThroughputMeter {
    pub fn new(source: Box<dyn CounterSource>, interval: Duration) -> Self {
        Self { source, interval, last: None }
    }

    /// First call has nothing to diff against and yields empty rates.
    /// Counter resets (negative deltas) clamp to zero.
    pub fn measure(&mut self) -> ThroughputSample {
        let current = match self.source.read() {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!("throughput counters unavailable: {}", e);
                return ThroughputSample::default();
            }
        };
        let Some(previous) = self.last.replace(current) else {
            return ThroughputSample::default();
        };
        let secs = self.interval.as_secs_f64();
        if secs <= 0.0 {
            return ThroughputSample::default();
        }
        let rate = |now: u64, before: u64| ((now as f64 - before as f64) / secs).max(0.0);
        ThroughputSample {
            in_bps: Some(rate(current.received, previous.received)),
            out_bps: Some(rate(current.sent, previous.sent)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<io::Result<ByteCounters>>);

    impl CounterSource for Scripted {
        fn read(&mut self) -> io::Result<ByteCounters> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "exhausted")))
        }
    }

    fn counters(received: u64, sent: u64) -> io::Result<ByteCounters> {
        Ok(ByteCounters { received, sent })
    }

    #[test]
    fn first_sample_is_indeterminate_then_rates_follow_delta() {
        let source = Scripted(VecDeque::from([counters(1_000, 500), counters(11_000, 2_500)]));
        let mut meter = ThroughputMeter::new(Box::new(source), Duration::from_secs(2));

        assert_eq!(meter.measure(), ThroughputSample::default());

        let sample = meter.measure();
        assert!((sample.in_bps.unwrap() - 5_000.0).abs() < 1e-9);
        assert!((sample.out_bps.unwrap() - 1_000.0).abs() < 1e-9);
    }

    #[test]
    fn counter_wrap_floors_at_zero() {
        let source = Scripted(VecDeque::from([counters(9_000, 9_000), counters(100, 9_600)]));
        let mut meter = ThroughputMeter::new(Box::new(source), Duration::from_millis(500));
        meter.measure();
        let sample = meter.measure();
        assert_eq!(sample.in_bps, Some(0.0));
        assert!((sample.out_bps.unwrap() - 1_200.0).abs() < 1e-9);
    }

    #[test]
    fn read_errors_yield_empty_sample() {
        let source = Scripted(VecDeque::new());
        let mut meter = ThroughputMeter::new(Box::new(source), Duration::from_secs(1));
        assert_eq!(meter.measure(), ThroughputSample::default());
    }

    #[test]
    fn parses_proc_net_dev_table() {
        let table = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  2000      20    0    0    0     0          0         0     2000      20    0    0    0     0       0          0
  eth0: 123456    900    0    0    0     0          0         0    65432     700    0    0    0     0       0          0
";
        let totals = parse_proc_net_dev(table).unwrap();
        assert_eq!(totals.received, 125_456);
        assert_eq!(totals.sent, 67_432);

        assert!(parse_proc_net_dev("garbage").is_err());
    }
}
