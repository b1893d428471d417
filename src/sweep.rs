/// Leak sweeper: deletes containers a failed teardown left behind
///
/// Only names the exerciser itself could have generated are touched:
/// a scenario prefix, exactly eight lowercase letters, and optionally the
/// index digits the listing scenario appends.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::StorageGateway;
use crate::names::NameGenerator;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    /// (container, error)
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lists every prefix and deletes the generated containers found. A listing
/// failure is returned; a failed delete is recorded and the sweep continues.
pub async fn sweep_leaked(gateway: &dyn StorageGateway, prefixes: &[&str]) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for prefix in prefixes {
        let listed = gateway.list_containers(prefix).await?;
        for container in listed {
            if !NameGenerator::is_generated(prefix, &container) || report.deleted.contains(&container) {
                continue;
            }
            match gateway.delete_container(&container).await {
                Ok(()) => {
                    info!("Swept leaked container {}", container);
                    report.deleted.push(container);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Could not sweep container {}: {}", container, e);
                    report.failed.push((container, e.to_string()));
                }
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, InMemoryGateway};

    #[tokio::test]
    async fn test_sweeps_only_generated_names() {
        let gateway = InMemoryGateway::new();
        for name in [
            "pageblobsabcdefgh",
            "containersamplezyxwvuts3",
            "pageblobs-production",
            "pageblobsABCDEFGH",
            "unrelated",
        ] {
            gateway.create_container(name).await.unwrap();
        }

        let report = sweep_leaked(&gateway, &["pageblobs", "containersample"]).await.unwrap();

        assert_eq!(report.deleted, vec!["pageblobsabcdefgh", "containersamplezyxwvuts3"]);
        assert!(report.is_clean());
        assert_eq!(gateway.container_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_deletes_are_reported() {
        let gateway = InMemoryGateway::new();
        gateway.create_container("blobcontainerqwertyui").await.unwrap();
        gateway.inject("delete_container", Fault::Fail);

        let report = sweep_leaked(&gateway, &["blobcontainer"]).await.unwrap();

        assert!(report.deleted.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "blobcontainerqwertyui");
    }

    #[tokio::test]
    async fn test_listing_failure_is_returned() {
        let gateway = InMemoryGateway::new();
        gateway.inject("list_containers", Fault::Fail);
        assert!(sweep_leaked(&gateway, &["blobcontainer"]).await.is_err());
    }
}
