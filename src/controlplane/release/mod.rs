//! Release Manager Adapters
//!
//! Provides adapters for materializing storage as chart releases:
//! - Helm: drives the `helm` CLI against a cluster
//! - In-memory: renders a synthetic release without a cluster (standalone)

pub mod helm;
pub mod memory;

pub use helm::*;
pub use memory::*;

use crate::domain::ports::ReleaseManagerRef;
use std::sync::Arc;
use uuid::Uuid;

/// Length of the random hex suffix appended to release names
pub const RELEASE_SUFFIX_LEN: usize = 4;

/// Generate a fresh release name for a storage base name (`pg1` -> `pg1-7f3a`)
pub fn generate_release_name(base: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..RELEASE_SUFFIX_LEN])
}

/// Which release manager to build
#[derive(Debug, Clone)]
pub enum ReleaseBackend {
    Helm(HelmConfig),
    InMemory { namespace: String },
}

/// Factory for release manager adapters
pub struct ReleaseManagerFactory;

impl ReleaseManagerFactory {
    pub fn create(backend: ReleaseBackend) -> ReleaseManagerRef {
        match backend {
            ReleaseBackend::Helm(config) => Arc::new(HelmReleaseManager::new(config)),
            ReleaseBackend::InMemory { namespace } => {
                Arc::new(InMemoryReleaseManager::new(namespace))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_release_name() {
        let name = generate_release_name("pg1");

        assert!(name.starts_with("pg1-"));
        assert_eq!(name.len(), "pg1-".len() + RELEASE_SUFFIX_LEN);
        assert!(name[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
