//! Cluster Status Providers
//!
//! Provides adapters answering the three status probes:
//! - Kubernetes: live workload, Service and PVC state via kube-rs
//! - Standalone: reports rendered resources as healthy, no cluster needed

pub mod kubernetes;
pub mod standalone;

pub use kubernetes::*;
pub use standalone::*;

use crate::domain::record::Probe;
use crate::error::Error;

/// Wrap a probe's underlying error in the probe taxonomy
pub(crate) fn probe_error(probe: Probe, err: Error) -> Error {
    match err {
        Error::StatusProbe { .. } => err,
        other => Error::StatusProbe {
            probe: probe.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_wraps_once() {
        let err = probe_error(Probe::VolumeClaim, Error::Internal("socket closed".into()));
        assert_eq!(
            err.to_string(),
            "Status probe 'volume_claim' failed: Internal error: socket closed"
        );

        let again = probe_error(Probe::Workload, err);
        assert!(again.to_string().starts_with("Status probe 'volume_claim'"));
    }
}
