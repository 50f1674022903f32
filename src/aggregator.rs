//! Maps one cycle's probe results to a single health verdict.

use crate::models::{CheckSet, Classification};

/// First matching rule wins. Depends only on booleans derived from the set,
/// so map iteration order has no effect.
pub fn classify(checks: &CheckSet) -> Classification {
    if !checks.address.ok {
        return Classification::NoLocalAddress;
    }
    if !checks.dns.ok {
        return Classification::DnsFailure;
    }

    let reachable = checks.any_reachable();
    // With no services configured this is vacuously true.
    let services_ok = checks.all_services_ok();

    if !checks.primary_http.ok {
        if reachable && services_ok {
            return Classification::PrimaryConnectivityProblem;
        }
        return Classification::PrimaryUnreachable;
    }

    if !reachable {
        return Classification::ReachabilityBlocked;
    }
    Classification::Healthy
}
